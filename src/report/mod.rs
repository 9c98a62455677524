//! Reporting utilities: formatted terminal output for training and forecasts.

pub mod format;

pub use format::*;
