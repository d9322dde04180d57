//! Discovered source files and the naming rules applied to them.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use super::constants::NO_EXTENSION_FOLDER;
use super::hasher::ContentDigest;

/// A regular file found under the source root.
///
/// Immutable once discovered; lives for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    path: PathBuf,
    size: u64,
    extension: OsString,
}

impl FileEntry {
    /// Creates an entry, deriving the extension folder from `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let extension = extension_folder(&path);
        Self {
            path,
            size,
            extension,
        }
    }

    /// Absolute path of the source file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size in bytes at discovery time.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Lower-cased extension without the dot, or `no_extension`.
    #[must_use]
    pub fn extension(&self) -> &OsStr {
        &self.extension
    }

    /// Final path component of the source file.
    #[must_use]
    pub fn file_name(&self) -> &OsStr {
        self.path.file_name().unwrap_or(self.path.as_os_str())
    }

    /// Destination folder for this entry under `dest_root`.
    #[must_use]
    pub fn destination_dir(&self, dest_root: &Path) -> PathBuf {
        dest_root.join(&self.extension)
    }

    /// Natural destination path: `dest_root/<ext>/<name>`.
    #[must_use]
    pub fn natural_destination(&self, dest_root: &Path) -> PathBuf {
        self.destination_dir(dest_root).join(self.file_name())
    }
}

/// Computes the extension folder name for a path.
///
/// The final suffix is lower-cased and stripped of its dot. Dotfiles such as
/// `.bashrc` and names ending in a bare dot have no suffix and map to
/// [`NO_EXTENSION_FOLDER`]. A suffix that is not valid UTF-8 is kept
/// byte for byte.
#[must_use]
pub fn extension_folder(path: &Path) -> OsString {
    match path.extension().filter(|ext| !ext.is_empty()) {
        Some(ext) => match ext.to_str() {
            Some(utf8) => OsString::from(utf8.to_lowercase()),
            None => ext.to_os_string(),
        },
        None => OsString::from(NO_EXTENSION_FOLDER),
    }
}

/// Builds the disambiguated file name `<stem>_<hash8>.<ext>`.
///
/// The original extension case is kept. Files without an extension become
/// `<name>_<hash8>`.
#[must_use]
pub fn renamed_file_name(path: &Path, digest: &ContentDigest) -> OsString {
    let file_name = path.file_name().unwrap_or(path.as_os_str());
    let extension = path.extension().filter(|ext| !ext.is_empty());
    let stem = match (extension, path.file_stem()) {
        (Some(_), Some(stem)) => stem,
        _ => file_name,
    };

    let mut renamed = OsString::with_capacity(file_name.len() + digest.short().len() + 1);
    renamed.push(stem);
    renamed.push("_");
    renamed.push(digest.short());
    if let Some(ext) = extension {
        renamed.push(".");
        renamed.push(ext);
    }
    renamed
}
