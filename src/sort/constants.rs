//! Constants for the sort module (chunk sizes, limiter bounds, folder names).

/// Read/write chunk size for hashing and streaming copies (64 KiB).
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Default number of files allowed mid-copy at once.
pub const DEFAULT_CONCURRENCY: usize = 100;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 1000;

/// Extension folder used for files without a suffix.
pub const NO_EXTENSION_FOLDER: &str = "no_extension";

/// Number of hex characters of the source digest used as a rename suffix.
pub const RENAME_SUFFIX_LEN: usize = 8;
