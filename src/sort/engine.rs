//! Sort engine: walks the source tree and fans out one bounded task per file.
//!
//! This module provides the [`SortEngine`], which coordinates concurrent copies
//! using a semaphore-based concurrency limit. Individual file failures are
//! reported and counted but never abort the run.
//!
//! # Example
//!
//! ```no_run
//! use copier_core::sort::SortEngine;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = SortEngine::new(100)?;
//! let stats = engine.run(Path::new("./incoming"), Path::new("./dist")).await?;
//! println!(
//!     "copied: {}, renamed: {}, skipped: {}, failed: {}",
//!     stats.copied(),
//!     stats.renamed(),
//!     stats.skipped(),
//!     stats.failed()
//! );
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::hasher::{ContentHasher, Sha256Hasher};
use super::resolver::PlannedWrites;
use super::sink::{EventSink, TracingSink};
use super::walker::discover;
use super::worker::{CopyOutcome, PathLocks, process_entry};

/// Fatal errors that stop a run before any file is dispatched.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The source path is missing or not a directory.
    #[error("{path} is not a directory")]
    SourceNotDirectory {
        /// The source path as given.
        path: PathBuf,
    },

    /// The destination root could not be created or resolved.
    #[error("failed to initialize destination {path}: {source}")]
    DestinationInit {
        /// The destination path as given.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The blocking source walk did not complete.
    #[error("source tree walk aborted: {0}")]
    Discovery(#[from] tokio::task::JoinError),

    /// Semaphore was closed unexpectedly.
    #[error("semaphore closed unexpectedly")]
    SemaphoreClosed,
}

/// Plain counters for one finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Files copied to their natural destination.
    pub copied: usize,
    /// Files skipped as identical duplicates.
    pub skipped: usize,
    /// Files copied under a hash-suffixed name.
    pub renamed: usize,
    /// Files that failed.
    pub failed: usize,
}

impl RunSummary {
    /// Total number of files that reached a terminal outcome.
    #[must_use]
    pub fn total(&self) -> usize {
        self.copied + self.skipped + self.renamed + self.failed
    }
}

/// Statistics from a sort run.
///
/// Uses atomic counters for thread-safe updates from concurrent tasks.
/// `peak_in_flight` records the largest number of files processed at the
/// same instant and never exceeds the engine's concurrency.
#[derive(Debug, Default)]
pub struct SortStats {
    copied: AtomicUsize,
    skipped: AtomicUsize,
    renamed: AtomicUsize,
    failed: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl SortStats {
    /// Creates a new stats tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of files copied to their natural destination.
    #[must_use]
    pub fn copied(&self) -> usize {
        self.copied.load(Ordering::SeqCst)
    }

    /// Returns the number of identical duplicates skipped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Returns the number of files copied under a new name.
    #[must_use]
    pub fn renamed(&self) -> usize {
        self.renamed.load(Ordering::SeqCst)
    }

    /// Returns the number of failed files.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Returns the total number of files that reached a terminal outcome.
    #[must_use]
    pub fn total(&self) -> usize {
        self.summary().total()
    }

    /// Returns the highest number of files processed concurrently.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Returns the counters as a plain value.
    #[must_use]
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            copied: self.copied(),
            skipped: self.skipped(),
            renamed: self.renamed(),
            failed: self.failed(),
        }
    }

    fn record(&self, outcome: &CopyOutcome) {
        let counter = match outcome {
            CopyOutcome::Copied(_) => &self.copied,
            CopyOutcome::Renamed(_) => &self.renamed,
            CopyOutcome::Skipped(_) => &self.skipped,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_failed(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
    }

    fn enter(&self) -> InFlightGuard<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        InFlightGuard { stats: self }
    }

    fn snapshot(&self) -> Self {
        Self {
            copied: AtomicUsize::new(self.copied()),
            skipped: AtomicUsize::new(self.skipped()),
            renamed: AtomicUsize::new(self.renamed()),
            failed: AtomicUsize::new(self.failed()),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(self.peak_in_flight()),
        }
    }
}

/// Decrements the in-flight counter on drop, including on panic.
struct InFlightGuard<'a> {
    stats: &'a SortStats,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Concurrent, deduplicating sort-by-extension engine.
///
/// # Concurrency Model
///
/// - Each file runs in its own Tokio task
/// - A semaphore permit is acquired before spawning each task, so at most
///   `concurrency` files are open at once regardless of tree size
/// - Permits are released automatically when tasks complete (RAII), including
///   when the task fails
/// - Decide-then-copy for one destination path is serialized by [`PathLocks`]
pub struct SortEngine {
    /// Semaphore for concurrency control.
    semaphore: Arc<Semaphore>,
    /// Configured concurrency limit.
    concurrency: usize,
    /// Digest implementation used for conflict checks.
    hasher: Arc<dyn ContentHasher>,
    /// Receiver for per-file outcomes. `None` logs through a [`TracingSink`]
    /// that follows `dry_run`.
    sink: Option<Arc<dyn EventSink>>,
    /// Resolve and report without writing anything.
    dry_run: bool,
}

impl fmt::Debug for SortEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortEngine")
            .field("concurrency", &self.concurrency)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl SortEngine {
    /// Creates an engine with SHA-256 hashing and `tracing` output.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if the value is outside
    /// the valid range (1-1000).
    ///
    /// # Example
    ///
    /// ```
    /// use copier_core::sort::SortEngine;
    ///
    /// let engine = SortEngine::new(100).unwrap();
    /// assert_eq!(engine.concurrency(), 100);
    /// ```
    #[instrument(level = "debug")]
    pub fn new(concurrency: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }

        debug!(concurrency, "creating sort engine");

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            hasher: Arc::new(Sha256Hasher),
            sink: None,
            dry_run: false,
        })
    }

    /// Replaces the content hasher.
    #[must_use]
    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Replaces the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Enables or disables dry-run mode.
    ///
    /// Unless a sink was set with [`with_sink`](Self::with_sink), log lines
    /// are tagged with the same mode.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns whether the engine writes nothing.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    fn event_sink(&self) -> Arc<dyn EventSink> {
        match &self.sink {
            Some(sink) => Arc::clone(sink),
            None => Arc::new(self.tracing_sink()),
        }
    }

    fn tracing_sink(&self) -> TracingSink {
        if self.dry_run {
            TracingSink::dry_run()
        } else {
            TracingSink::new()
        }
    }

    /// Sorts every file under `src_root` into `dest_root/<ext>/`.
    ///
    /// This method:
    /// 1. Validates the source directory and creates the destination root
    /// 2. Walks the source tree, pruning the destination if it is nested inside
    /// 3. Creates every extension folder up front
    /// 4. Spawns one task per file, bounded by the semaphore
    /// 5. Returns statistics once every file has a terminal outcome
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SourceNotDirectory`] or
    /// [`EngineError::DestinationInit`] before any work starts, and
    /// [`EngineError::Discovery`] / [`EngineError::SemaphoreClosed`] for
    /// internal failures.
    ///
    /// Note: Individual file failures do NOT cause this method to error.
    /// They are reported to the sink and counted in the stats.
    #[instrument(skip(self), fields(src = %src_root.display(), dst = %dest_root.display()))]
    pub async fn run(&self, src_root: &Path, dest_root: &Path) -> Result<SortStats, EngineError> {
        let src = resolve_source_root(src_root).await?;
        let dest = self.prepare_destination_root(dest_root).await?;

        info!(src = %src.display(), dst = %dest.display(), dry_run = self.dry_run, "starting sort");

        let walk_src = src.clone();
        let walk_dest = dest.clone();
        let discovery =
            tokio::task::spawn_blocking(move || discover(&walk_src, &walk_dest)).await?;

        let stats = Arc::new(SortStats::new());
        let sink = self.event_sink();

        for error in &discovery.errors {
            sink.on_failed(error.path(), error);
            stats.increment_failed();
        }

        if !self.dry_run {
            for folder in discovery.extension_folders() {
                let dir = dest.join(folder);
                // A failure here resurfaces per file when the worker retries it.
                if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                    warn!(dir = %dir.display(), error = %e, "failed to pre-create extension folder");
                }
            }
        }

        let locks = Arc::new(PathLocks::new());
        let planned = self.dry_run.then(|| Arc::new(PlannedWrites::new()));
        let mut handles = Vec::with_capacity(discovery.entries.len());

        for entry in discovery.entries {
            // Acquire semaphore permit (waits if at concurrency limit)
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::SemaphoreClosed)?;

            let stats = Arc::clone(&stats);
            let hasher = Arc::clone(&self.hasher);
            let sink = Arc::clone(&sink);
            let locks = Arc::clone(&locks);
            let planned = planned.clone();
            let dest = dest.clone();

            handles.push(tokio::spawn(async move {
                // Permit is dropped when this block exits (RAII)
                let _permit = permit;
                let _in_flight = stats.enter();

                let outcome = process_entry(
                    &entry,
                    &dest,
                    hasher.as_ref(),
                    &locks,
                    planned.as_deref(),
                )
                .await;

                match outcome {
                    Ok(outcome) => {
                        match &outcome {
                            CopyOutcome::Copied(path) => sink.on_copied(entry.path(), path),
                            CopyOutcome::Renamed(path) => sink.on_renamed(entry.path(), path),
                            CopyOutcome::Skipped(path) => sink.on_skipped(entry.path(), path),
                        }
                        stats.record(&outcome);
                    }
                    Err(e) => {
                        sink.on_failed(entry.path(), &e);
                        stats.increment_failed();
                    }
                }
            }));
        }

        debug!(task_count = handles.len(), "waiting for copies to complete");

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "copy task panicked");
                stats.increment_failed();
            }
        }

        let summary = stats.summary();
        sink.on_completed(&summary);
        debug!(
            total = summary.total(),
            peak_in_flight = stats.peak_in_flight(),
            "sort finished"
        );

        // All tasks have been joined, so this is normally the last reference.
        Ok(Arc::try_unwrap(stats).unwrap_or_else(|shared| shared.snapshot()))
    }

    async fn prepare_destination_root(&self, dest_root: &Path) -> Result<PathBuf, EngineError> {
        let init_err = |source| EngineError::DestinationInit {
            path: dest_root.to_path_buf(),
            source,
        };

        if self.dry_run {
            return canonicalize_existing_prefix(dest_root).map_err(init_err);
        }

        tokio::fs::create_dir_all(dest_root)
            .await
            .map_err(init_err)?;
        tokio::fs::canonicalize(dest_root).await.map_err(init_err)
    }
}

async fn resolve_source_root(src_root: &Path) -> Result<PathBuf, EngineError> {
    let not_a_dir = || EngineError::SourceNotDirectory {
        path: src_root.to_path_buf(),
    };
    let src = tokio::fs::canonicalize(src_root)
        .await
        .map_err(|_| not_a_dir())?;
    match tokio::fs::metadata(&src).await {
        Ok(meta) if meta.is_dir() => Ok(src),
        _ => Err(not_a_dir()),
    }
}

/// Canonicalizes the longest existing ancestor of `path` and re-appends the
/// missing tail, so a destination that does not exist yet can still be
/// compared against canonical source paths.
fn canonicalize_existing_prefix(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();

    loop {
        match std::fs::canonicalize(existing) {
            Ok(mut resolved) => {
                for component in missing.iter().rev() {
                    resolved.push(component);
                }
                return Ok(resolved);
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
                    return Err(e);
                };
                missing.push(name.to_os_string());
                existing = parent;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::sort::sink::{MemorySink, SortEvent};

    #[test]
    fn test_engine_new_valid_concurrency() {
        assert_eq!(SortEngine::new(1).unwrap().concurrency(), 1);
        assert_eq!(SortEngine::new(100).unwrap().concurrency(), 100);
        assert_eq!(SortEngine::new(1000).unwrap().concurrency(), 1000);
    }

    #[test]
    fn test_engine_new_invalid_concurrency_zero() {
        let result = SortEngine::new(0);
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
    }

    #[test]
    fn test_engine_new_invalid_concurrency_too_high() {
        let result = SortEngine::new(1001);
        assert!(matches!(
            result,
            Err(EngineError::InvalidConcurrency { value: 1001 })
        ));
    }

    #[test]
    fn test_engine_error_display() {
        let msg = EngineError::InvalidConcurrency { value: 0 }.to_string();
        assert!(msg.contains("invalid concurrency"));
        assert!(msg.contains("1000"));

        let msg = EngineError::SourceNotDirectory {
            path: PathBuf::from("/nope"),
        }
        .to_string();
        assert_eq!(msg, "/nope is not a directory");
    }

    #[test]
    fn test_engine_builder_flags() {
        let engine = SortEngine::new(4).unwrap().with_dry_run(true);
        assert!(engine.is_dry_run());
        assert!(engine.tracing_sink().is_dry_run());
        assert!(format!("{engine:?}").contains("concurrency: 4"));
        assert!(!engine.with_dry_run(false).tracing_sink().is_dry_run());
    }

    #[test]
    fn test_sort_stats_default() {
        let stats = SortStats::default();
        assert_eq!(stats.summary(), RunSummary::default());
        assert_eq!(stats.total(), 0);
        assert_eq!(stats.peak_in_flight(), 0);
    }

    #[test]
    fn test_sort_stats_record_outcomes() {
        let stats = SortStats::new();
        stats.record(&CopyOutcome::Copied(PathBuf::from("/d/txt/a.txt")));
        stats.record(&CopyOutcome::Copied(PathBuf::from("/d/txt/b.txt")));
        stats.record(&CopyOutcome::Renamed(PathBuf::from("/d/txt/a_01234567.txt")));
        stats.record(&CopyOutcome::Skipped(PathBuf::from("/d/txt/c.txt")));
        stats.increment_failed();

        assert_eq!(
            stats.summary(),
            RunSummary {
                copied: 2,
                skipped: 1,
                renamed: 1,
                failed: 1
            }
        );
        assert_eq!(stats.total(), 5);
    }

    #[test]
    fn test_sort_stats_in_flight_peak() {
        let stats = SortStats::new();
        {
            let _a = stats.enter();
            let _b = stats.enter();
            {
                let _c = stats.enter();
            }
            let _d = stats.enter();
        }
        assert_eq!(stats.peak_in_flight(), 3);
        assert_eq!(stats.in_flight.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_sort_stats_thread_safe() {
        use std::thread;

        let stats = Arc::new(SortStats::new());
        let mut handles = Vec::new();

        for _ in 0..10 {
            let stats = Arc::clone(&stats);
            handles.push(thread::spawn(move || {
                for _ in 0..100 {
                    stats.record(&CopyOutcome::Copied(PathBuf::new()));
                    stats.increment_failed();
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(stats.copied(), 1000);
        assert_eq!(stats.failed(), 1000);
        assert_eq!(stats.total(), 2000);
    }

    #[test]
    fn test_canonicalize_existing_prefix_appends_missing_tail() {
        let dir = TempDir::new().unwrap();
        let root = std::fs::canonicalize(dir.path()).unwrap();
        let resolved = canonicalize_existing_prefix(&dir.path().join("a/b")).unwrap();
        assert_eq!(resolved, root.join("a").join("b"));
        assert!(!root.join("a").exists());
    }

    #[tokio::test]
    async fn test_run_rejects_file_as_source() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("plain.txt");
        std::fs::write(&file, b"x").unwrap();

        let engine = SortEngine::new(2).unwrap();
        let err = engine.run(&file, &dir.path().join("dist")).await.unwrap_err();

        assert!(matches!(err, EngineError::SourceNotDirectory { .. }));
        assert!(!dir.path().join("dist").exists(), "no work before validation");
    }

    #[tokio::test]
    async fn test_run_reports_completion_to_sink() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.txt"), b"hello").unwrap();
        let sink = Arc::new(MemorySink::new());

        let engine = SortEngine::new(2).unwrap().with_sink(sink.clone());
        let stats = engine.run(&src, &dir.path().join("dist")).await.unwrap();

        assert_eq!(stats.copied(), 1);
        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SortEvent::Copied { .. }));
        assert_eq!(events[1], SortEvent::Completed(stats.summary()));
    }

    #[tokio::test]
    async fn test_run_dry_run_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        std::fs::create_dir_all(&src).unwrap();
        std::fs::write(src.join("a.txt"), b"hello").unwrap();
        std::fs::write(src.join("notes"), b"x").unwrap();
        let dist = dir.path().join("out/dist");

        let engine = SortEngine::new(2)
            .unwrap()
            .with_dry_run(true)
            .with_sink(Arc::new(MemorySink::new()));
        let stats = engine.run(&src, &dist).await.unwrap();

        assert_eq!(stats.copied(), 2);
        assert!(!dir.path().join("out").exists());
    }
}
