//! Utility functions

pub mod format;
pub mod progress_log;
mod sanitize;

pub use format::{format_bytes, format_elapsed, pad_position};
pub use progress_log::ProgressLogWriter;
pub use sanitize::sanitize_filename;
#[cfg(test)]
pub use sanitize::DENYLIST;
