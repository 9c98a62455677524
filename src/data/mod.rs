//! Data preparation: cleaning raw yearly records and windowing normalized series.

pub mod clean;
pub mod window;

pub use clean::{CleanReport, RawRecord, clean_series, clean_series_with_report, derive_sum};
pub use window::{Window, WindowSet, make_windows, require_windows};
