use std::path::{Path, PathBuf};

use {
    sha2::{Digest, Sha256},
    tracing::debug,
};

use crate::error::{Context, Result};

/// Longest extension kept from a remote file name (without the dot).
const MAX_EXTENSION_LEN: usize = 8;

/// Content-addressed file cache: `<dir>/<sha256-hex><ext>`.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

/// A file written to (or found in) the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub file_name: String,
    pub path: PathBuf,
    /// The same content was already cached; nothing was written.
    pub reused: bool,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `bytes` under their content hash with extension `ext`
    /// (`".jpg"`, or empty).
    pub async fn put(&self, bytes: &[u8], ext: &str) -> Result<StoredFile> {
        let file_name = format!("{}{ext}", content_hash(bytes));
        let path = self.dir.join(&file_name);

        if let Ok(meta) = tokio::fs::metadata(&path).await
            && meta.len() == bytes.len() as u64
        {
            debug!(file = %file_name, "media already cached");
            return Ok(StoredFile {
                file_name,
                path,
                reused: true,
            });
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("create cache dir {}", self.dir.display()))?;
        let partial = self.dir.join(format!("{file_name}.part"));
        tokio::fs::write(&partial, bytes)
            .await
            .with_context(|| format!("write {}", partial.display()))?;
        tokio::fs::rename(&partial, &path)
            .await
            .with_context(|| format!("rename into {}", path.display()))?;
        debug!(file = %file_name, size = bytes.len(), "media cached");

        Ok(StoredFile {
            file_name,
            path,
            reused: false,
        })
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Pick the cache extension: the remote path's extension when it is short
/// and alphanumeric, else `fallback`.
#[must_use]
pub fn extension_for(remote_path: &str, fallback: &str) -> String {
    Path::new(remote_path)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| {
            !e.is_empty()
                && e.len() <= MAX_EXTENSION_LEN
                && e.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_else(|| fallback.to_string())
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            content_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn extension_prefers_remote_path() {
        assert_eq!(extension_for("photos/file_1.JPG", ".bin"), ".jpg");
        assert_eq!(extension_for("stickers/file_2", ".webp"), ".webp");
        assert_eq!(extension_for("odd/file.tar~gz", ".bin"), ".bin");
        assert_eq!(extension_for("", ""), "");
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = MediaStore::new(dir.path().join("cache"));

        let first = store.put(b"image-bytes", ".jpg").await.unwrap();
        assert!(!first.reused);
        assert!(first.file_name.ends_with(".jpg"));
        assert_eq!(std::fs::read(&first.path).unwrap(), b"image-bytes");

        let second = store.put(b"image-bytes", ".jpg").await.unwrap();
        assert!(second.reused);
        assert_eq!(first.file_name, second.file_name);

        let entries = std::fs::read_dir(store.dir()).unwrap().count();
        assert_eq!(entries, 1, "no leftover partial files");
    }
}
