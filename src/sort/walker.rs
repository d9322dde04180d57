//! Source tree enumeration.
//!
//! [`discover`] is synchronous (it is built on `walkdir`); the engine runs it on
//! the blocking pool.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::Path;

use tracing::{debug, trace};
use walkdir::WalkDir;

use super::entry::FileEntry;
use super::error::SortError;

/// Result of walking the source tree.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Regular files to sort, in walk order.
    pub entries: Vec<FileEntry>,
    /// Entries that could not be read. Each counts as one failed file.
    pub errors: Vec<SortError>,
}

impl Discovery {
    /// Distinct extension folder names across all entries.
    #[must_use]
    pub fn extension_folders(&self) -> BTreeSet<&OsStr> {
        self.entries.iter().map(FileEntry::extension).collect()
    }
}

/// Recursively collects every regular file under `src_root`.
///
/// The subtree rooted at `dest_root` is pruned, so a destination nested inside
/// the source is never fed back into the run. Both paths should be
/// canonicalized by the caller. Symlinked directories are not followed; a
/// symlink to a regular file counts as that file, and dangling links are
/// ignored.
#[must_use]
pub fn discover(src_root: &Path, dest_root: &Path) -> Discovery {
    let mut discovery = Discovery::default();

    let walker = WalkDir::new(src_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !entry.path().starts_with(dest_root));

    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                let path = e.path().unwrap_or(src_root).to_path_buf();
                discovery.errors.push(SortError::walk(path, e.to_string()));
                continue;
            }
        };

        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        // `metadata` on the std side follows symlinks; walkdir's does not.
        let metadata = if file_type.is_symlink() {
            match std::fs::metadata(entry.path()) {
                Ok(meta) => meta,
                Err(e) => {
                    debug!(path = %entry.path().display(), error = %e, "skipping dangling symlink");
                    continue;
                }
            }
        } else {
            match entry.metadata() {
                Ok(meta) => meta,
                Err(e) => {
                    discovery
                        .errors
                        .push(SortError::walk(entry.path(), e.to_string()));
                    continue;
                }
            }
        };

        if !metadata.is_file() {
            trace!(path = %entry.path().display(), "skipping non-regular file");
            continue;
        }

        discovery
            .entries
            .push(FileEntry::new(entry.into_path(), metadata.len()));
    }

    debug!(
        files = discovery.entries.len(),
        errors = discovery.errors.len(),
        "source walk finished"
    );
    discovery
}
