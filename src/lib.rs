//! Copier Core Library
//!
//! This library sorts a directory tree into per-extension folders, copying
//! files concurrently and deduplicating by content hash.
//!
//! # Architecture
//!
//! - [`sort`] - Source walk, conflict resolution, streaming copy and the
//!   bounded-concurrency engine that ties them together

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod sort;

// Re-export commonly used types
pub use sort::{
    ContentHasher, CopyOutcome, DEFAULT_CONCURRENCY, EngineError, EventSink, MAX_CONCURRENCY,
    MIN_CONCURRENCY, RunSummary, Sha256Hasher, SortEngine, SortError, SortStats, TracingSink,
};
