//! Concurrent sort-by-extension copier with content-hash deduplication.
//!
//! Every regular file under a source tree is copied into
//! `<dest>/<extension>/`. When a file with the same name is already there,
//! sizes are compared first and SHA-256 digests second:
//!
//! - identical content is skipped
//! - different content is copied as `<stem>_<hash8>.<ext>`
//!
//! Files run concurrently under a bounded limiter. A failing file is reported
//! and counted, never fatal to the run.
//!
//! # Example
//!
//! ```no_run
//! use copier_core::sort::SortEngine;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let stats = SortEngine::new(100)?
//!     .run(Path::new("./photos"), Path::new("./dist"))
//!     .await?;
//! assert_eq!(stats.total(), stats.copied() + stats.renamed() + stats.skipped() + stats.failed());
//! # Ok(())
//! # }
//! ```

mod constants;
mod engine;
mod entry;
mod error;
mod hasher;
mod resolver;
mod sink;
mod walker;
mod worker;

pub use constants::{
    CHUNK_SIZE, DEFAULT_CONCURRENCY, MAX_CONCURRENCY, MIN_CONCURRENCY, NO_EXTENSION_FOLDER,
    RENAME_SUFFIX_LEN,
};
pub use engine::{EngineError, RunSummary, SortEngine, SortStats};
pub use entry::{FileEntry, extension_folder, renamed_file_name};
pub use error::SortError;
pub use hasher::{ContentDigest, ContentHasher, Sha256Hasher, hash_file};
pub use resolver::{CopyDecision, PlannedWrites, resolve, resolve_planned};
pub use sink::{EventSink, MemorySink, SortEvent, TracingSink};
pub use walker::{Discovery, discover};
pub use worker::{CopyOutcome, PathLocks, process_entry};
