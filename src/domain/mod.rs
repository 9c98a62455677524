//! Domain types used throughout the pipeline.
//!
//! This module defines:
//!
//! - yearly observations and cleaned series (`YearRecord`, `Series`)
//! - model configuration enums (`ModelKind`, `Purpose`, `TargetSpec`)
//! - training/forecast outputs (`ModelMetadata`, `ForecastPoint`, `Metrics`, ...)

pub mod types;

pub use types::*;
