//! `emigrant-forecast` library crate.
//!
//! The binary (`ef`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the training, forecasting and persistence pieces can be reused by other front ends

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod forecast;
pub mod io;
pub mod math;
pub mod models;
pub mod report;
pub mod store;
