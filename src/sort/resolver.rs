//! Destination resolution and name/content conflict handling.
//!
//! Given a source file and the destination root, [`resolve`] picks where the
//! file should land and whether it needs copying at all:
//!
//! 1. Nothing at `dest/<ext>/<name>` → [`CopyDecision::Fresh`].
//! 2. Existing file with a different size → [`CopyDecision::RenameCopy`]. Only
//!    the source is hashed; the size mismatch already proves the content differs.
//! 3. Same size → both files are hashed. Equal digests give
//!    [`CopyDecision::SkipDuplicate`], different digests give a rename.
//!
//! Renamed copies are written as `<stem>_<hash8>.<ext>`, where `hash8` comes
//! from the source digest. If that name is already taken by an identical file
//! the source is a duplicate of the earlier renamed copy and is skipped; if it
//! is taken by anything else the file fails with
//! [`SortError::RenameCollision`] and nothing is overwritten.
//!
//! Dry runs write nothing, so [`resolve_planned`] layers a [`PlannedWrites`]
//! table over the destination: a path claimed earlier in the same run counts
//! as occupied by the source that claimed it.

use std::io;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use tracing::{debug, instrument};

use super::entry::{FileEntry, renamed_file_name};
use super::error::SortError;
use super::hasher::{ContentDigest, ContentHasher};

/// Outcome of conflict resolution for one [`FileEntry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyDecision {
    /// No file exists at the natural destination.
    Fresh {
        /// Natural destination path.
        dest_path: PathBuf,
    },
    /// An identical file (same size, same digest) is already in place.
    SkipDuplicate {
        /// The existing destination file.
        existing_path: PathBuf,
    },
    /// A different file occupies the natural destination.
    RenameCopy {
        /// Hash-suffixed destination path.
        dest_path: PathBuf,
        /// Source digest the suffix was taken from.
        digest: ContentDigest,
    },
}

impl CopyDecision {
    /// Path the decision points at (write target, or the existing duplicate).
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Fresh { dest_path } | Self::RenameCopy { dest_path, .. } => dest_path,
            Self::SkipDuplicate { existing_path } => existing_path,
        }
    }
}

/// A write a dry run would have made.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PlannedFile {
    source: PathBuf,
    size: u64,
}

/// Destinations claimed during a dry run, keyed by destination path.
#[derive(Debug, Default)]
pub struct PlannedWrites {
    files: DashMap<PathBuf, PlannedFile>,
}

impl PlannedWrites {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `entry` would be written to `dest_path`.
    pub fn record(&self, dest_path: impl Into<PathBuf>, entry: &FileEntry) {
        self.files.insert(
            dest_path.into(),
            PlannedFile {
                source: entry.path().to_path_buf(),
                size: entry.size(),
            },
        );
    }

    /// Source file planned for `dest_path`, if any.
    #[must_use]
    pub fn source_for(&self, dest_path: &Path) -> Option<PathBuf> {
        self.files.get(dest_path).map(|file| file.source.clone())
    }

    /// Number of planned writes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Returns `true` if nothing has been planned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    fn size_of(&self, dest_path: &Path) -> Option<u64> {
        self.files.get(dest_path).map(|file| file.size)
    }
}

/// Decides the destination path and copy action for `entry`.
///
/// # Errors
///
/// Returns [`SortError::Io`] if either file cannot be inspected,
/// [`SortError::Hash`] if hashing fails, and [`SortError::RenameCollision`]
/// if the hash-suffixed name is held by a different file.
pub async fn resolve(
    entry: &FileEntry,
    dest_root: &Path,
    hasher: &dyn ContentHasher,
) -> Result<CopyDecision, SortError> {
    resolve_planned(entry, dest_root, hasher, None).await
}

/// Like [`resolve`], but paths recorded in `planned` count as occupied.
///
/// # Errors
///
/// Same as [`resolve`].
#[instrument(level = "debug", skip_all, fields(source = %entry.path().display()))]
pub async fn resolve_planned(
    entry: &FileEntry,
    dest_root: &Path,
    hasher: &dyn ContentHasher,
    planned: Option<&PlannedWrites>,
) -> Result<CopyDecision, SortError> {
    let natural = entry.natural_destination(dest_root);

    let Some(existing_size) = occupant_size(&natural, planned).await? else {
        return Ok(CopyDecision::Fresh { dest_path: natural });
    };

    let source_size = tokio::fs::metadata(entry.path())
        .await
        .map_err(|e| SortError::io(entry.path(), e))?
        .len();

    let source_digest = hasher.hash(entry.path()).await?;

    if existing_size == Some(source_size) {
        let existing_digest = hash_occupant(&natural, planned, hasher).await?;
        if existing_digest == source_digest {
            debug!(existing = %natural.display(), "identical content at destination");
            return Ok(CopyDecision::SkipDuplicate {
                existing_path: natural,
            });
        }
        debug!(existing = %natural.display(), "same size, different content");
    } else {
        debug!(
            existing = %natural.display(),
            source_size,
            ?existing_size,
            "size mismatch, skipping destination hash"
        );
    }

    resolve_rename_target(entry, dest_root, source_size, source_digest, hasher, planned).await
}

async fn resolve_rename_target(
    entry: &FileEntry,
    dest_root: &Path,
    source_size: u64,
    digest: ContentDigest,
    hasher: &dyn ContentHasher,
    planned: Option<&PlannedWrites>,
) -> Result<CopyDecision, SortError> {
    let target = entry
        .destination_dir(dest_root)
        .join(renamed_file_name(entry.path(), &digest));

    match occupant_size(&target, planned).await? {
        None => Ok(CopyDecision::RenameCopy {
            dest_path: target,
            digest,
        }),
        Some(Some(size)) if size == source_size => {
            if hash_occupant(&target, planned, hasher).await? != digest {
                return Err(SortError::rename_collision(entry.path(), target));
            }
            debug!(existing = %target.display(), "renamed copy already present");
            Ok(CopyDecision::SkipDuplicate {
                existing_path: target,
            })
        }
        Some(_) => Err(SortError::rename_collision(entry.path(), target)),
    }
}

async fn occupant_size(
    path: &Path,
    planned: Option<&PlannedWrites>,
) -> Result<Option<Option<u64>>, SortError> {
    if let Some(size) = planned.and_then(|p| p.size_of(path)) {
        return Ok(Some(Some(size)));
    }
    existing_file_size(path).await
}

/// Hashes whatever occupies `path`: the planned source, else the file itself.
async fn hash_occupant(
    path: &Path,
    planned: Option<&PlannedWrites>,
    hasher: &dyn ContentHasher,
) -> Result<ContentDigest, SortError> {
    match planned.and_then(|p| p.source_for(path)) {
        Some(source) => hasher.hash(&source).await,
        None => hasher.hash(path).await,
    }
}

/// Looks up what occupies `path`.
///
/// `None` when nothing is there, `Some(Some(len))` for a regular file and
/// `Some(None)` for anything else (a directory can never be a duplicate).
async fn existing_file_size(path: &Path) -> Result<Option<Option<u64>>, SortError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(Some(Some(meta.len()))),
        Ok(_) => Ok(Some(None)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(SortError::io(path, e)),
    }
}
