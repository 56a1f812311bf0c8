//! Nested progress display and row bookkeeping

pub mod chain;
pub mod display;

pub use chain::{RowChain, RowToken};
pub use display::{Level, LevelBar, PrintChannel, ProgressDisplay};
