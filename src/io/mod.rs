//! Input/output helpers.
//!
//! - raw record ingest from CSV or JSON (`ingest`)
//! - forecast exports to CSV (`export`)
//! - export artifact read/write (`artifact`)

pub mod artifact;
pub mod export;
pub mod ingest;

pub use artifact::*;
pub use export::*;
pub use ingest::*;
