//! Size and checksum validation of files on disk.
//!
//! An absent expectation always passes. Checksums are computed by streaming
//! the whole file, every time; there is no metadata shortcut.

use std::io::Read;
use std::path::{Path, PathBuf};

use md5::Md5;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::{Checksum, ChecksumAlgorithm};

use super::error::ArtifactError;

/// Read buffer for hashing (1MB)
const CHUNK_SIZE: usize = 1024 * 1024;

/// Size of a file in bytes
pub async fn file_size(path: &Path) -> Result<u64, ArtifactError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(ArtifactError::filesystem("get file size of", path))?;
    Ok(metadata.len())
}

/// Hex digest of a file's contents
pub async fn compute_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<String, ArtifactError> {
    let owned: PathBuf = path.to_path_buf();
    let hashed = tokio::task::spawn_blocking(move || match algorithm {
        ChecksumAlgorithm::Md5 => hash_file::<Md5>(&owned),
        ChecksumAlgorithm::Sha256 => hash_file::<Sha256>(&owned),
    })
    .await
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));

    hashed
        .and_then(|result| result)
        .map_err(ArtifactError::filesystem("hash", path))
}

fn hash_file<D: Digest>(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = D::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// True when no size is declared or the file has exactly that size
pub async fn size_matches(expected: Option<u64>, path: &Path) -> Result<bool, ArtifactError> {
    match expected {
        None => Ok(true),
        Some(expected) => Ok(file_size(path).await? == expected),
    }
}

/// True when no checksum is declared or the file hashes to it
pub async fn checksum_matches(
    expected: Option<&Checksum>,
    path: &Path,
) -> Result<bool, ArtifactError> {
    match expected {
        None => Ok(true),
        Some(expected) => {
            let actual = compute_checksum(path, expected.algorithm).await?;
            Ok(expected.matches(&actual))
        }
    }
}

/// Fail with [`ArtifactError::SizeMismatch`] unless the size matches
pub async fn check_size(expected: Option<u64>, path: &Path) -> Result<(), ArtifactError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let actual = file_size(path).await?;
    if actual != expected {
        return Err(ArtifactError::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }

    debug!(path = %path.display(), size = actual, "Size verified");
    Ok(())
}

/// Fail with [`ArtifactError::ChecksumMismatch`] unless the checksum matches
pub async fn check_checksum(expected: Option<&Checksum>, path: &Path) -> Result<(), ArtifactError> {
    let Some(expected) = expected else {
        return Ok(());
    };

    let actual = compute_checksum(path, expected.algorithm).await?;
    if !expected.matches(&actual) {
        return Err(ArtifactError::ChecksumMismatch {
            path: path.to_path_buf(),
            algorithm: expected.algorithm,
            expected: expected.digest.clone(),
            actual,
        });
    }

    debug!(path = %path.display(), algorithm = %expected.algorithm, "Checksum verified");
    Ok(())
}
