//! Error types for the sort module.
//!
//! [`SortError`] covers everything that can go wrong while processing a single
//! file. These errors are caught at the worker boundary, reported to the event
//! sink and counted; they never abort the run.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors that can occur while sorting one source file.
#[derive(Debug, Error)]
pub enum SortError {
    /// File system error while reading, writing or inspecting a file.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file could not be read to completion while computing its digest.
    #[error("failed to hash {path}: {source}")]
    Hash {
        /// The file being hashed.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The hash-suffixed rename target already exists with different content.
    #[error("rename target {target} already exists with different content than {source_path}")]
    RenameCollision {
        /// The source file that could not be placed.
        source_path: PathBuf,
        /// The occupied rename target.
        target: PathBuf,
    },

    /// An entry could not be read during directory traversal.
    #[error("failed to read directory entry {path}: {message}")]
    Walk {
        /// The entry (or its parent directory) that failed.
        path: PathBuf,
        /// Error text reported by the walker.
        message: String,
    },
}

impl SortError {
    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a hashing error.
    pub fn hash(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Hash {
            path: path.into(),
            source,
        }
    }

    /// Creates a rename collision error.
    pub fn rename_collision(source_path: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self::RenameCollision {
            source_path: source_path.into(),
            target: target.into(),
        }
    }

    /// Creates a traversal error.
    pub fn walk(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Walk {
            path: path.into(),
            message: message.into(),
        }
    }

    /// The path the error is about.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. } | Self::Hash { path, .. } | Self::Walk { path, .. } => path,
            Self::RenameCollision { source_path, .. } => source_path,
        }
    }
}

// No `From<std::io::Error>` impls: every variant needs the path, which the
// source error does not carry. Use the constructors above.
