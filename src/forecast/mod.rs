//! Recursive forecasting from a trained model and its metadata.

pub mod recursive;

pub use recursive::{RecursiveForecaster, forecast, forecast_paired};
