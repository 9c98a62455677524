//! Training orchestration.
//!
//! Responsibilities:
//!
//! - clean, normalize and window the raw records of one purpose
//! - build and train the selected architecture
//! - score the fit and assemble the metadata needed to reuse the model
//! - reject a new run while another is in flight

pub mod guard;
pub mod session;

pub use guard::*;
pub use session::*;
