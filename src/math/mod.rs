//! Numeric utilities: min-max scaling and accuracy metrics.

pub mod metrics;
pub mod scale;

pub use metrics::{AccuracyPolicy, compute_metrics, compute_metrics_with, validation_table};
pub use scale::{NormalizedRow, NormalizedSeries, denormalize, fit, normalize, widen};
