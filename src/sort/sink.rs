//! Outcome reporting for sort runs.
//!
//! Workers never log directly; they report through an [`EventSink`]. The
//! default [`TracingSink`] turns events into `tracing` records (INFO for
//! copies, skips and renames, ERROR for failures). [`MemorySink`] keeps the
//! events in memory so tests can assert on them.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::{error, info};

use super::engine::RunSummary;
use super::error::SortError;

/// Receiver for per-file outcomes and the end-of-run summary.
///
/// Called concurrently from worker tasks; implementations must be cheap and
/// must not block for long.
pub trait EventSink: Send + Sync {
    /// A file was copied to its natural destination.
    fn on_copied(&self, source: &Path, destination: &Path);

    /// A file was skipped because an identical copy already exists.
    fn on_skipped(&self, source: &Path, existing: &Path);

    /// A file was copied under a hash-suffixed name.
    fn on_renamed(&self, source: &Path, destination: &Path);

    /// Processing a file failed; the run continues.
    fn on_failed(&self, source: &Path, error: &SortError);

    /// Every dispatched file reached a terminal outcome.
    fn on_completed(&self, _summary: &RunSummary) {}
}

/// Writes one human-readable log line per event via `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink {
    dry_run: bool,
}

impl TracingSink {
    /// Creates a sink for a normal run.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink that tags every record as a dry run.
    #[must_use]
    pub fn dry_run() -> Self {
        Self { dry_run: true }
    }

    /// Whether records are tagged as a dry run.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

impl EventSink for TracingSink {
    fn on_copied(&self, source: &Path, destination: &Path) {
        info!(
            source = %source.display(),
            destination = %destination.display(),
            dry_run = self.dry_run,
            "Copied file"
        );
    }

    fn on_skipped(&self, source: &Path, existing: &Path) {
        info!(
            source = %source.display(),
            existing = %existing.display(),
            dry_run = self.dry_run,
            "Skipped duplicate (identical content)"
        );
    }

    fn on_renamed(&self, source: &Path, destination: &Path) {
        info!(
            source = %source.display(),
            destination = %destination.display(),
            dry_run = self.dry_run,
            "Duplicate with different content, copied with new name"
        );
    }

    fn on_failed(&self, source: &Path, error: &SortError) {
        error!(source = %source.display(), error = %error, "Error processing file");
    }

    fn on_completed(&self, summary: &RunSummary) {
        info!(
            copied = summary.copied,
            skipped = summary.skipped,
            renamed = summary.renamed,
            failed = summary.failed,
            dry_run = self.dry_run,
            "Processing completed."
        );
    }
}

/// One recorded sink event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortEvent {
    /// See [`EventSink::on_copied`].
    Copied {
        /// Source file.
        source: PathBuf,
        /// Written destination.
        destination: PathBuf,
    },
    /// See [`EventSink::on_skipped`].
    Skipped {
        /// Source file.
        source: PathBuf,
        /// Identical file already present.
        existing: PathBuf,
    },
    /// See [`EventSink::on_renamed`].
    Renamed {
        /// Source file.
        source: PathBuf,
        /// Hash-suffixed destination.
        destination: PathBuf,
    },
    /// See [`EventSink::on_failed`].
    Failed {
        /// Source file.
        source: PathBuf,
        /// Rendered error.
        error: String,
    },
    /// See [`EventSink::on_completed`].
    Completed(RunSummary),
}

/// Collects events in memory, in the order they were reported.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SortEvent>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<SortEvent> {
        self.lock().clone()
    }

    /// Source paths of all failure events.
    #[must_use]
    pub fn failed_sources(&self) -> Vec<PathBuf> {
        self.lock()
            .iter()
            .filter_map(|event| match event {
                SortEvent::Failed { source, .. } => Some(source.clone()),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: SortEvent) {
        self.lock().push(event);
    }

    // Events are append-only, so a poisoned lock still holds a usable log.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SortEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventSink for MemorySink {
    fn on_copied(&self, source: &Path, destination: &Path) {
        self.push(SortEvent::Copied {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
        });
    }

    fn on_skipped(&self, source: &Path, existing: &Path) {
        self.push(SortEvent::Skipped {
            source: source.to_path_buf(),
            existing: existing.to_path_buf(),
        });
    }

    fn on_renamed(&self, source: &Path, destination: &Path) {
        self.push(SortEvent::Renamed {
            source: source.to_path_buf(),
            destination: destination.to_path_buf(),
        });
    }

    fn on_failed(&self, source: &Path, error: &SortError) {
        self.push(SortEvent::Failed {
            source: source.to_path_buf(),
            error: error.to_string(),
        });
    }

    fn on_completed(&self, summary: &RunSummary) {
        self.push(SortEvent::Completed(*summary));
    }
}
