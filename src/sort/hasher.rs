//! Streaming content digests.
//!
//! Files are hashed in [`CHUNK_SIZE`] reads so memory use stays flat regardless
//! of file size. The [`ContentHasher`] trait is the seam the resolver hashes
//! through; [`Sha256Hasher`] is the production implementation.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{instrument, trace};

use super::constants::{CHUNK_SIZE, RENAME_SUFFIX_LEN};
use super::error::SortError;

/// Hex-encoded digest of a file's full byte stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentDigest(String);

impl ContentDigest {
    /// Wraps an already hex-encoded digest.
    #[must_use]
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Full hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Rename suffix: the first 8 hex characters.
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self.0.len().min(RENAME_SUFFIX_LEN);
        self.0.get(..end).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Computes content digests for files on disk.
///
/// Implementations must stream the file rather than load it whole, and must
/// surface read failures as [`SortError::Hash`] instead of returning a partial
/// digest.
#[async_trait]
pub trait ContentHasher: Send + Sync {
    /// Hashes the file at `path`.
    async fn hash(&self, path: &Path) -> Result<ContentDigest, SortError>;
}

/// SHA-256 hasher reading 64 KiB chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

#[async_trait]
impl ContentHasher for Sha256Hasher {
    async fn hash(&self, path: &Path) -> Result<ContentDigest, SortError> {
        hash_file(path).await
    }
}

/// Computes the SHA-256 digest of a file with chunked async reads.
///
/// # Errors
///
/// Returns [`SortError::Hash`] if the file cannot be opened or becomes
/// unreadable mid-stream.
#[instrument(level = "trace", skip_all, fields(path = %path.display()))]
pub async fn hash_file(path: &Path) -> Result<ContentDigest, SortError> {
    let mut file = File::open(path)
        .await
        .map_err(|e| SortError::hash(path, e))?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total: u64 = 0;

    loop {
        let n = file
            .read(&mut buf)
            .await
            .map_err(|e| SortError::hash(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    let digest = ContentDigest(format!("{:x}", hasher.finalize()));
    trace!(bytes = total, digest = %digest, "hashed file");
    Ok(digest)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";
    const EMPTY_SHA256: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[tokio::test]
    async fn test_hash_file_known_digest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("hello.txt");
        std::fs::write(&path, b"hello").unwrap();

        let digest = hash_file(&path).await.unwrap();
        assert_eq!(digest.as_str(), HELLO_SHA256);
        assert_eq!(digest.short(), "2cf24dba");
    }

    #[tokio::test]
    async fn test_hash_file_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty");
        std::fs::write(&path, b"").unwrap();

        let digest = hash_file(&path).await.unwrap();
        assert_eq!(digest.as_str(), EMPTY_SHA256);
    }

    #[tokio::test]
    async fn test_hash_file_spanning_multiple_chunks() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.bin");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 3 + 17)).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let streamed = hash_file(&path).await.unwrap();
        let expected = format!("{:x}", Sha256::digest(&data));
        assert_eq!(streamed.as_str(), expected);
    }

    #[tokio::test]
    async fn test_hash_file_missing_file_is_hash_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.txt");

        let err = hash_file(&path).await.unwrap_err();
        assert!(matches!(err, SortError::Hash { .. }), "got {err:?}");
        assert!(err.to_string().contains("missing.txt"));
    }

    #[tokio::test]
    async fn test_sha256_hasher_matches_hash_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.txt");
        std::fs::write(&path, b"hello").unwrap();

        let hasher: &dyn ContentHasher = &Sha256Hasher;
        assert_eq!(hasher.hash(&path).await.unwrap().as_str(), HELLO_SHA256);
    }

    #[test]
    fn test_content_digest_short_of_short_input() {
        let digest = ContentDigest::from_hex("abc");
        assert_eq!(digest.short(), "abc");
        assert_eq!(digest.to_string(), "abc");
    }
}
