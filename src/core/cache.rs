//! Artifact cache: the entry point a task executor calls per declared artifact.
//!
//! `fetch` returns a path in the cache directory that is guaranteed to match
//! the artifact's declared size and checksum. Downloads land in a temporary
//! file beside the final slot and are renamed into place only after they
//! verify, so a reader never sees a partial or unverified file at that path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempPath;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::adapters::{
    CommandRunner, FetchBackend, Fetcher, HttpFetcher, ProcessRunner, TarExtractor, WgetFetcher,
};
use crate::config::ResolvedConfig;
use crate::domain::{validate_filename, Artifact, EmbeddedArtifact, ExternalArtifact};

use super::error::ArtifactError;
use super::lock::{slot_name, CacheLock};
use super::retry::RetryPolicy;
use super::verify;

/// Resolves artifacts for one task
pub struct ArtifactManager {
    cache_dir: PathBuf,
    log_path: PathBuf,
    task_id: String,
    fetcher: Arc<dyn Fetcher>,
    extractor: TarExtractor,
    retry: RetryPolicy,
}

impl ArtifactManager {
    /// Create a manager that runs real processes
    pub fn new(config: &ResolvedConfig, task_id: impl Into<String>) -> Result<Self, ArtifactError> {
        Self::with_runner(config, task_id, Arc::new(ProcessRunner::new()))
    }

    /// Create a manager with an injected process runner
    pub fn with_runner(
        config: &ResolvedConfig,
        task_id: impl Into<String>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, ArtifactError> {
        let task_id = task_id.into();
        let log_path = config.task_log_path(&task_id);
        let timeout = config.tools.command_timeout();

        let fetcher: Arc<dyn Fetcher> = match config.tools.fetch_backend {
            FetchBackend::Wget => Arc::new(
                WgetFetcher::new(&config.tools.wget_path, runner.clone(), &log_path)
                    .with_timeout(timeout),
            ),
            FetchBackend::Http => Arc::new(
                HttpFetcher::new(timeout).map_err(|source| ArtifactError::HttpClient { source })?,
            ),
        };

        let extractor =
            TarExtractor::new(&config.tools.tar_path, runner, &log_path).with_timeout(timeout);

        Ok(Self {
            cache_dir: config.cache_dir.clone(),
            log_path,
            task_id,
            fetcher,
            extractor,
            retry: config.retry.clone(),
        })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Cache slot for a filename
    pub fn cached_path(&self, filename: &str) -> Result<PathBuf, ArtifactError> {
        check_filename(filename)?;
        Ok(self.cache_dir.join(filename))
    }

    /// Whether the cache slot exists and matches every declared expectation
    pub async fn is_cached(&self, artifact: &ExternalArtifact) -> Result<bool, ArtifactError> {
        let cached_path = self.cached_path(artifact.filename())?;
        self.check_cached(artifact, &cached_path).await
    }

    async fn check_cached(
        &self,
        artifact: &ExternalArtifact,
        cached_path: &Path,
    ) -> Result<bool, ArtifactError> {
        let exists = tokio::fs::try_exists(cached_path)
            .await
            .map_err(ArtifactError::filesystem("stat", cached_path))?;
        if !exists {
            debug!(path = %cached_path.display(), "Cached file does not exist");
            return Ok(false);
        }

        if !verify::size_matches(artifact.filesize(), cached_path).await? {
            debug!(
                path = %cached_path.display(),
                expected = ?artifact.filesize(),
                "Cached file does not match declared size"
            );
            return Ok(false);
        }

        if !verify::checksum_matches(artifact.checksum(), cached_path).await? {
            debug!(
                path = %cached_path.display(),
                "Cached file does not match declared checksum"
            );
            return Ok(false);
        }

        Ok(true)
    }

    /// Return a verified cache path for the artifact, downloading on a miss
    #[instrument(skip(self, artifact), fields(task_id = %self.task_id, artifact = %artifact.name()))]
    pub async fn fetch(&self, artifact: &ExternalArtifact) -> Result<PathBuf, ArtifactError> {
        let cached_path = self.cached_path(artifact.filename())?;

        if self.check_cached(artifact, &cached_path).await? {
            info!(path = %cached_path.display(), "Using cached file");
            return Ok(cached_path);
        }

        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(ArtifactError::filesystem("create cache directory", &self.cache_dir))?;

        let _lock = CacheLock::acquire(&self.cache_dir, artifact.filename()).await?;

        // Another executor may have filled the slot while we waited
        if self.check_cached(artifact, &cached_path).await? {
            info!(path = %cached_path.display(), "Using file cached by concurrent fetch");
            return Ok(cached_path);
        }

        self.download_and_cache(artifact, &cached_path).await?;
        Ok(cached_path)
    }

    async fn download_and_cache(
        &self,
        artifact: &ExternalArtifact,
        cached_path: &Path,
    ) -> Result<(), ArtifactError> {
        let temp_path = self.download_and_check(artifact).await?;

        temp_path
            .persist(cached_path)
            .map_err(|e| ArtifactError::Filesystem {
                action: "move download into",
                path: cached_path.to_path_buf(),
                source: e.error,
            })?;

        info!(path = %cached_path.display(), "Cached artifact");
        Ok(())
    }

    /// Download into a fresh temp file and verify it.
    ///
    /// The temp file is deleted on every error path when the `TempPath` drops.
    async fn download_and_check(&self, artifact: &ExternalArtifact) -> Result<TempPath, ArtifactError> {
        let mut attempt = 1;

        loop {
            let temp_path = self.create_temp_path(artifact.filename())?;
            let fetched = self.fetcher.fetch(&artifact.url, &temp_path).await;

            match fetched {
                Ok(()) => {
                    verify::check_size(artifact.filesize(), &temp_path).await?;
                    verify::check_checksum(artifact.checksum(), &temp_path).await?;
                    return Ok(temp_path);
                }
                Err(e) if e.is_transient() && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        ?delay,
                        error = %e,
                        "Download failed, retrying"
                    );
                    drop(temp_path);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(ArtifactError::from_fetch(
                        artifact.name(),
                        &artifact.url,
                        attempt,
                        e,
                    ));
                }
            }
        }
    }

    fn create_temp_path(&self, filename: &str) -> Result<TempPath, ArtifactError> {
        let file = tempfile::Builder::new()
            .prefix(&format!(".{}.", slot_name(filename)))
            .suffix(".part")
            .tempfile_in(&self.cache_dir)
            .map_err(ArtifactError::filesystem(
                "create temporary file in",
                &self.cache_dir,
            ))?;
        Ok(file.into_temp_path())
    }

    /// Write an embedded artifact to `directory/filename`, never overwriting.
    ///
    /// Size and checksum are checked after the write; on mismatch the file
    /// is left in place and an integrity error is returned. A failed write
    /// removes the file again.
    #[instrument(skip(self, artifact, directory), fields(task_id = %self.task_id, artifact = %artifact.name()))]
    pub async fn extract(
        &self,
        artifact: &EmbeddedArtifact,
        directory: &Path,
    ) -> Result<PathBuf, ArtifactError> {
        check_filename(artifact.filename())?;
        let extract_to = directory.join(artifact.filename());

        info!(path = %extract_to.display(), "Extracting embedded artifact");

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&extract_to)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    ArtifactError::AlreadyExists {
                        path: extract_to.clone(),
                    }
                } else {
                    ArtifactError::Filesystem {
                        action: "create",
                        path: extract_to.clone(),
                        source: e,
                    }
                }
            })?;

        write_new_file(file, &extract_to, &artifact.content).await?;

        verify::check_size(artifact.filesize(), &extract_to).await?;
        verify::check_checksum(artifact.checksum(), &extract_to).await?;

        Ok(extract_to)
    }

    /// Unpack a gzipped tarball into an existing directory
    #[instrument(skip(self), fields(task_id = %self.task_id))]
    pub async fn untar(&self, source: &Path, destination: &Path) -> Result<(), ArtifactError> {
        self.extractor
            .untar(source, destination)
            .await
            .map_err(|e| {
                ArtifactError::from_untar(source.to_path_buf(), destination.to_path_buf(), e)
            })
    }
}

/// Fill a file we just created, deleting it if the write does not complete
async fn write_new_file(
    mut file: tokio::fs::File,
    path: &Path,
    content: &[u8],
) -> Result<(), ArtifactError> {
    let written: std::io::Result<()> = async {
        file.write_all(content).await?;
        file.flush().await?;
        file.sync_all().await
    }
    .await;
    drop(file);

    if let Err(source) = written {
        if let Err(e) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), error = %e, "Failed to remove partial file");
        }
        return Err(ArtifactError::Filesystem {
            action: "write",
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}

fn check_filename(filename: &str) -> Result<(), ArtifactError> {
    validate_filename(filename).map_err(|reason| ArtifactError::InvalidFilename {
        filename: filename.to_string(),
        reason,
    })
}

impl std::fmt::Debug for ArtifactManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactManager")
            .field("cache_dir", &self.cache_dir)
            .field("log_path", &self.log_path)
            .field("task_id", &self.task_id)
            .field("fetcher", &self.fetcher.name())
            .field("retry", &self.retry)
            .finish()
    }
}
