//! Per-filename advisory locks inside the cache directory.
//!
//! Executors sharing one cache directory serialize downloads of the same
//! filename through `<cache>/.locks/<filename>.lock`. The lock is released
//! when the guard is dropped.

use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::error::ArtifactError;

/// Directory holding lock files, relative to the cache directory
pub const LOCK_DIR: &str = ".locks";

/// Longest filename used verbatim in lock and temp file names
const MAX_SLOT_NAME_LEN: usize = 128;

/// Bytes of the original filename kept when it is shortened
const SHORT_PREFIX_LEN: usize = 64;

/// Name used for files derived from a cache slot (lock, temp download).
///
/// Those add a prefix or suffix to the filename, so a filename close to the
/// filesystem's name limit is cut down to a prefix plus a digest of the whole.
pub(crate) fn slot_name(filename: &str) -> Cow<'_, str> {
    if filename.len() <= MAX_SLOT_NAME_LEN {
        return Cow::Borrowed(filename);
    }

    let mut end = SHORT_PREFIX_LEN;
    while !filename.is_char_boundary(end) {
        end -= 1;
    }
    let digest = hex::encode(Sha256::digest(filename.as_bytes()));
    Cow::Owned(format!("{}-{}", &filename[..end], &digest[..16]))
}

/// Held exclusive lock on one cache slot
#[derive(Debug)]
pub struct CacheLock {
    file: File,
    path: PathBuf,
}

impl CacheLock {
    /// Path of the lock file for a filename
    pub fn lock_path(cache_dir: &Path, filename: &str) -> PathBuf {
        cache_dir
            .join(LOCK_DIR)
            .join(format!("{}.lock", slot_name(filename)))
    }

    /// Block until the exclusive lock for `filename` is held
    pub async fn acquire(cache_dir: &Path, filename: &str) -> Result<Self, ArtifactError> {
        let path = Self::lock_path(cache_dir, filename);
        let owned = path.clone();

        let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
            if let Some(parent) = owned.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(&owned)?;
            file.lock_exclusive()?;
            Ok(file)
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
        .and_then(|result| result)
        .map_err(ArtifactError::filesystem("lock", &path))?;

        debug!(lock = %path.display(), "Acquired cache lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CacheLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock as well
        let _ = self.file.unlock();
    }
}
