//! Downloading a URI into a local file.
//!
//! Two backends: shelling out to `wget` (the deployment default) and a
//! native `reqwest` client that streams the body to disk.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::process::{CommandRunner, Invocation, ProcessError};

/// wget exit statuses worth another attempt: network failure (4) and
/// server error response (8). Usage, local I/O, TLS and auth errors are not.
const WGET_TRANSIENT_EXIT_CODES: &[i32] = &[4, 8];

/// Failure retrieving a URI
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error("GET {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("GET {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to write download to {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Process(ProcessError::NonZeroExit { code, .. }) => {
                WGET_TRANSIENT_EXIT_CODES.contains(code)
            }
            Self::Process(ProcessError::TimedOut { .. }) => true,
            Self::Process(ProcessError::Launch { .. }) => false,
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Request { .. } => true,
            Self::Io { .. } => false,
        }
    }
}

/// Which downloader to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchBackend {
    /// External `wget` binary
    Wget,

    /// Native HTTP client
    Http,
}

impl Default for FetchBackend {
    fn default() -> Self {
        Self::Wget
    }
}

/// Retrieves a URI into a destination file, overwriting it
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError>;
}

/// Downloads by running `wget`
pub struct WgetFetcher {
    binary_path: String,
    runner: Arc<dyn CommandRunner>,
    log_path: PathBuf,
    timeout: Option<Duration>,
}

impl WgetFetcher {
    pub fn new(
        binary_path: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
        log_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            binary_path: binary_path.into(),
            runner,
            log_path: log_path.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// `wget <url> -O <dest> -nv --no-check-certificate`
    pub fn invocation(&self, url: &str, destination: &Path) -> Invocation {
        Invocation::new(&self.binary_path, &self.log_path)
            .arg(url)
            .arg("-O")
            .arg(destination)
            .arg("-nv")
            .arg("--no-check-certificate")
            .with_timeout(self.timeout)
    }
}

#[async_trait]
impl Fetcher for WgetFetcher {
    fn name(&self) -> &str {
        "wget"
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        info!(%url, destination = %destination.display(), "Downloading");
        self.runner.run(&self.invocation(url, destination)).await?;
        Ok(())
    }
}

/// Downloads with a native HTTP client
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Build a client; certificate checks are off to match the wget contract
    pub fn new(timeout: Option<Duration>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<(), FetchError> {
        info!(%url, destination = %destination.display(), "Downloading");

        let request_error = |source| FetchError::Request {
            url: url.to_string(),
            source,
        };
        let io_error = |source| FetchError::Io {
            path: destination.to_path_buf(),
            source,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let mut file = tokio::fs::File::create(destination)
            .await
            .map_err(io_error)?;

        let mut total_bytes = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(request_error)? {
            file.write_all(&chunk).await.map_err(io_error)?;
            total_bytes += chunk.len() as u64;
        }
        file.flush().await.map_err(io_error)?;

        debug!(%url, total_bytes, "Download finished");
        Ok(())
    }
}
