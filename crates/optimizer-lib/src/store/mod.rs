//! Metric sample storage
//!
//! This module provides the bounded, time-windowed ledger of per-request
//! observations that every other component learns from:
//! - Insertion-ordered ring buffer with a hard capacity
//! - Bounded per-endpoint tails for cheap endpoint reads
//! - Trailing-window load and error counts
//! - Periodic retention sweep

mod buffer;
mod sweeper;

pub use buffer::{SampleStore, StoreConfig, StoreStats, ENDPOINT_INDEX_DEPTH, LOAD_WINDOW};
pub use sweeper::RetentionSweeper;
