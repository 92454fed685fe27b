//! Errors from resolving an artifact.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::adapters::{FetchError, ProcessError};
use crate::domain::ChecksumAlgorithm;

/// Broad classification of an [`ArtifactError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArtifact,
    Integrity,
    Download,
    Extraction,
    ProcessLaunch,
    Timeout,
    Filesystem,
}

/// A fetch, extract or untar call failed. Nothing is retried past this point.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Invalid filename '{filename}': {reason}")]
    InvalidFilename {
        filename: String,
        reason: &'static str,
    },

    #[error("Filesize {actual} ({}) does not match expected ({expected})", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("{algorithm} {actual} ({}) does not match expected ({expected})", .path.display())]
    ChecksumMismatch {
        path: PathBuf,
        algorithm: ChecksumAlgorithm,
        expected: String,
        actual: String,
    },

    #[error("Failed to download {artifact} from {url} after {attempts} attempt(s): {source}")]
    DownloadFailed {
        artifact: String,
        url: String,
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error("Failed to build HTTP client: {source}")]
    HttpClient {
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to extract {} into {}: exit code {code} from `{command}`", .archive.display(), .destination.display())]
    ExtractionFailed {
        archive: PathBuf,
        destination: PathBuf,
        command: String,
        code: i32,
    },

    #[error("Failed to run `{command}`: {source}")]
    ProcessLaunch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command `{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },

    #[error("Refusing to overwrite existing file {}", .path.display())]
    AlreadyExists { path: PathBuf },

    #[error("Couldn't {action} {}: {source}", .path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ArtifactError {
    pub(crate) fn filesystem(
        action: &'static str,
        path: impl Into<PathBuf>,
    ) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Filesystem {
            action,
            path,
            source,
        }
    }

    /// Map a download failure, pulling launch and timeout problems out of
    /// the generic download bucket.
    pub(crate) fn from_fetch(artifact: &str, url: &str, attempts: u32, err: FetchError) -> Self {
        match err {
            FetchError::Process(ProcessError::Launch { command, source }) => {
                Self::ProcessLaunch { command, source }
            }
            FetchError::Process(ProcessError::TimedOut { command, timeout }) => {
                Self::TimedOut { command, timeout }
            }
            other => Self::DownloadFailed {
                artifact: artifact.to_string(),
                url: url.to_string(),
                attempts,
                source: other,
            },
        }
    }

    pub(crate) fn from_untar(archive: PathBuf, destination: PathBuf, err: ProcessError) -> Self {
        match err {
            ProcessError::NonZeroExit { command, code } => Self::ExtractionFailed {
                archive,
                destination,
                command,
                code,
            },
            ProcessError::Launch { command, source } => Self::ProcessLaunch { command, source },
            ProcessError::TimedOut { command, timeout } => Self::TimedOut { command, timeout },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidFilename { .. } => ErrorKind::InvalidArtifact,
            Self::SizeMismatch { .. } | Self::ChecksumMismatch { .. } => ErrorKind::Integrity,
            Self::DownloadFailed { .. } | Self::HttpClient { .. } => ErrorKind::Download,
            Self::ExtractionFailed { .. } => ErrorKind::Extraction,
            Self::ProcessLaunch { .. } => ErrorKind::ProcessLaunch,
            Self::TimedOut { .. } => ErrorKind::Timeout,
            Self::AlreadyExists { .. } | Self::Filesystem { .. } => ErrorKind::Filesystem,
        }
    }

    /// Exit code of the external tool, when it ran and failed
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::ExtractionFailed { code, .. } => Some(*code),
            Self::DownloadFailed {
                source: FetchError::Process(process),
                ..
            } => process.exit_code(),
            _ => None,
        }
    }

    /// Command line of the external tool involved, if any
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::ExtractionFailed { command, .. }
            | Self::ProcessLaunch { command, .. }
            | Self::TimedOut { command, .. } => Some(command),
            Self::DownloadFailed {
                source: FetchError::Process(process),
                ..
            } => Some(process.command()),
            _ => None,
        }
    }
}
