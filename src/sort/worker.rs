//! Per-file processing: resolve the destination, then stream the bytes.
//!
//! [`process_entry`] is what each spawned task runs once it holds a limiter
//! permit. It returns the outcome instead of logging it; the engine reports
//! outcomes to the event sink and updates the run counters.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};

use super::constants::CHUNK_SIZE;
use super::entry::FileEntry;
use super::error::SortError;
use super::hasher::ContentHasher;
use super::resolver::{CopyDecision, PlannedWrites, resolve_planned};

/// Terminal outcome of a successfully processed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// Copied to its natural destination.
    Copied(PathBuf),
    /// Copied under a hash-suffixed name.
    Renamed(PathBuf),
    /// Identical content already present at this path.
    Skipped(PathBuf),
}

/// Per-destination-path locks.
///
/// The decide-then-copy sequence for a natural destination path runs while
/// holding that path's lock, so two sources with the same name and extension
/// folder cannot both observe an empty slot and write over each other.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl PathLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `path`.
    pub async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        // Clone the Arc so the DashMap shard lock is released before awaiting.
        let mutex = Arc::clone(&self.locks.entry(path.to_path_buf()).or_default());
        mutex.lock_owned().await
    }

    /// Number of distinct paths seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns `true` if no path has been locked yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// How the destination file is opened for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    /// Create or truncate.
    Truncate,
    /// Fail if the file already exists.
    CreateNew,
}

/// Processes one source file end to end.
///
/// Ensures the extension folder exists, resolves the copy decision and
/// performs the streaming copy. With `planned` set this is a dry run: nothing
/// is written, and each write that would have happened is recorded there so
/// later sources resolve against it.
///
/// # Errors
///
/// Any [`SortError`] from resolution or copying. The caller treats it as a
/// failure of this file only.
#[instrument(level = "debug", skip_all, fields(source = %entry.path().display()))]
pub async fn process_entry(
    entry: &FileEntry,
    dest_root: &Path,
    hasher: &dyn ContentHasher,
    locks: &PathLocks,
    planned: Option<&PlannedWrites>,
) -> Result<CopyOutcome, SortError> {
    if planned.is_none() {
        let dest_dir = entry.destination_dir(dest_root);
        tokio::fs::create_dir_all(&dest_dir)
            .await
            .map_err(|e| SortError::io(&dest_dir, e))?;
    }

    let natural = entry.natural_destination(dest_root);
    let _guard = locks.lock(&natural).await;

    let decision = resolve_planned(entry, dest_root, hasher, planned).await?;
    debug!(?decision, "resolved destination");

    match decision {
        CopyDecision::Fresh { dest_path } => {
            if let Some(planned) = planned {
                planned.record(&dest_path, entry);
            } else {
                stream_copy(entry.path(), &dest_path, WriteMode::Truncate).await?;
            }
            Ok(CopyOutcome::Copied(dest_path))
        }
        CopyDecision::RenameCopy { dest_path, .. } => {
            if let Some(planned) = planned {
                planned.record(&dest_path, entry);
            } else {
                stream_copy(entry.path(), &dest_path, WriteMode::CreateNew)
                    .await
                    .map_err(|e| match e {
                        SortError::Io { source, .. }
                            if source.kind() == io::ErrorKind::AlreadyExists =>
                        {
                            SortError::rename_collision(entry.path(), &dest_path)
                        }
                        other => other,
                    })?;
            }
            Ok(CopyOutcome::Renamed(dest_path))
        }
        CopyDecision::SkipDuplicate { existing_path } => Ok(CopyOutcome::Skipped(existing_path)),
    }
}

/// Copies `src` to `dst` in [`CHUNK_SIZE`] pieces and returns the byte count.
///
/// A destination left incomplete by a failed read or write is removed.
async fn stream_copy(src: &Path, dst: &Path, mode: WriteMode) -> Result<u64, SortError> {
    let mut reader = File::open(src).await.map_err(|e| SortError::io(src, e))?;

    let mut options = OpenOptions::new();
    options.write(true);
    match mode {
        WriteMode::Truncate => options.create(true).truncate(true),
        WriteMode::CreateNew => options.create_new(true),
    };
    let mut writer = options.open(dst).await.map_err(|e| SortError::io(dst, e))?;

    let result = pump(&mut reader, &mut writer, src, dst).await;
    if result.is_err() {
        drop(writer);
        if let Err(e) = tokio::fs::remove_file(dst).await {
            warn!(path = %dst.display(), error = %e, "failed to remove partial copy");
        }
    }
    result
}

async fn pump(
    reader: &mut File,
    writer: &mut File,
    src: &Path,
    dst: &Path,
) -> Result<u64, SortError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;
    loop {
        let n = reader.read(&mut buf).await.map_err(|e| SortError::io(src, e))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|e| SortError::io(dst, e))?;
        total += n as u64;
    }
    writer.flush().await.map_err(|e| SortError::io(dst, e))?;
    Ok(total)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::sort::hasher::Sha256Hasher;

    fn source(dir: &TempDir, name: &str, content: &[u8]) -> FileEntry {
        let path = dir.path().join("src").join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        FileEntry::new(path, content.len() as u64)
    }

    #[tokio::test]
    async fn test_process_entry_fresh_copy_creates_folder() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst");
        let entry = source(&dir, "a.txt", b"hello");

        let outcome = process_entry(&entry, &dst, &Sha256Hasher, &PathLocks::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome, CopyOutcome::Copied(dst.join("txt/a.txt")));
        assert_eq!(std::fs::read(dst.join("txt/a.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_process_entry_large_file_is_byte_identical() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 123)).map(|i| (i % 239) as u8).collect();
        let entry = source(&dir, "blob.bin", &data);

        process_entry(&entry, &dst, &Sha256Hasher, &PathLocks::new(), None)
            .await
            .unwrap();

        assert_eq!(std::fs::read(dst.join("bin/blob.bin")).unwrap(), data);
    }

    #[tokio::test]
    async fn test_process_entry_skip_leaves_destination_untouched() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst");
        std::fs::create_dir_all(dst.join("txt")).unwrap();
        std::fs::write(dst.join("txt/a.txt"), b"hello").unwrap();
        let before = std::fs::metadata(dst.join("txt/a.txt"))
            .unwrap()
            .modified()
            .unwrap();
        let entry = source(&dir, "a.txt", b"hello");

        let outcome = process_entry(&entry, &dst, &Sha256Hasher, &PathLocks::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome, CopyOutcome::Skipped(dst.join("txt/a.txt")));
        let after = std::fs::metadata(dst.join("txt/a.txt"))
            .unwrap()
            .modified()
            .unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_process_entry_rename_keeps_original() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst");
        std::fs::create_dir_all(dst.join("txt")).unwrap();
        std::fs::write(dst.join("txt/a.txt"), b"world").unwrap();
        let entry = source(&dir, "a.txt", b"hello");

        let outcome = process_entry(&entry, &dst, &Sha256Hasher, &PathLocks::new(), None)
            .await
            .unwrap();

        assert_eq!(outcome, CopyOutcome::Renamed(dst.join("txt/a_2cf24dba.txt")));
        assert_eq!(std::fs::read(dst.join("txt/a.txt")).unwrap(), b"world");
        assert_eq!(std::fs::read(dst.join("txt/a_2cf24dba.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_process_entry_dry_run_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst");
        let entry = source(&dir, "a.txt", b"hello");

        let planned = PlannedWrites::new();

        let outcome = process_entry(&entry, &dst, &Sha256Hasher, &PathLocks::new(), Some(&planned))
            .await
            .unwrap();

        assert_eq!(outcome, CopyOutcome::Copied(dst.join("txt/a.txt")));
        assert!(!dst.exists());
        assert_eq!(planned.source_for(&dst.join("txt/a.txt")), Some(entry.path().to_path_buf()));
    }

    #[tokio::test]
    async fn test_dry_run_same_name_sources_match_real_outcomes() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst");
        let first = source(&dir, "one/a.txt", b"first");
        let second = source(&dir, "two/a.txt", b"other");
        let third = source(&dir, "three/a.txt", b"first");
        let locks = PathLocks::new();
        let planned = PlannedWrites::new();

        let mut outcomes = Vec::new();
        for entry in [&first, &second, &third] {
            outcomes.push(
                process_entry(entry, &dst, &Sha256Hasher, &locks, Some(&planned))
                    .await
                    .unwrap(),
            );
        }

        assert_eq!(outcomes[0], CopyOutcome::Copied(dst.join("txt/a.txt")));
        assert!(matches!(outcomes[1], CopyOutcome::Renamed(_)));
        assert_eq!(outcomes[2], CopyOutcome::Skipped(dst.join("txt/a.txt")));
        assert_eq!(planned.len(), 2);
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn test_process_entry_vanished_source_is_error() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst");
        let entry = source(&dir, "a.txt", b"hello");
        std::fs::remove_file(entry.path()).unwrap();

        let err = process_entry(&entry, &dst, &Sha256Hasher, &PathLocks::new(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, SortError::Io { .. }), "got {err:?}");
        assert!(!dst.join("txt/a.txt").exists(), "no partial copy left behind");
    }

    #[tokio::test]
    async fn test_same_name_sources_are_serialized() {
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("dst");
        let first = source(&dir, "one/a.txt", b"first");
        let second = source(&dir, "two/a.txt", b"other");
        let locks = PathLocks::new();

        let (a, b) = tokio::join!(
            process_entry(&first, &dst, &Sha256Hasher, &locks, None),
            process_entry(&second, &dst, &Sha256Hasher, &locks, None),
        );
        let mut outcomes = vec![a.unwrap(), b.unwrap()];
        outcomes.sort_by_key(|o| matches!(o, CopyOutcome::Renamed(_)));

        assert!(matches!(outcomes[0], CopyOutcome::Copied(_)));
        assert!(matches!(outcomes[1], CopyOutcome::Renamed(_)));
        assert_eq!(locks.len(), 1);
        let copied = std::fs::read_dir(dst.join("txt")).unwrap().count();
        assert_eq!(copied, 2);
    }

    #[tokio::test]
    async fn test_path_locks_exclusive_per_path() {
        let locks = Arc::new(PathLocks::new());
        let guard = locks.lock(Path::new("/dst/txt/a.txt")).await;

        let other = Arc::clone(&locks);
        let blocked = tokio::spawn(async move {
            let _g = other.lock(Path::new("/dst/txt/a.txt")).await;
        });
        let free = locks.lock(Path::new("/dst/txt/b.txt")).await;
        drop(free);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!blocked.is_finished());
        drop(guard);
        blocked.await.unwrap();
        assert_eq!(locks.len(), 2);
    }
}
