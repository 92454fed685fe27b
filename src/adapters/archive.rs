//! Unpacking gzipped tarballs with the system `tar`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::process::{CommandRunner, Invocation, ProcessError};

/// Extracts archives by running `tar`
pub struct TarExtractor {
    binary_path: String,
    runner: Arc<dyn CommandRunner>,
    log_path: PathBuf,
    timeout: Option<Duration>,
}

impl TarExtractor {
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

    /// `tar -oxzf <source> -C <destination>`
    pub fn invocation(&self, source: &Path, destination: &Path) -> Invocation {
        Invocation::new(&self.binary_path, &self.log_path)
            .arg("-oxzf")
            .arg(source)
            .arg("-C")
            .arg(destination)
            .with_timeout(self.timeout)
    }

    /// Unpack into an existing directory, overwriting files already there.
    ///
    /// A failed run may leave the destination partially populated.
    pub async fn untar(&self, source: &Path, destination: &Path) -> Result<(), ProcessError> {
        info!(
            source = %source.display(),
            destination = %destination.display(),
            "Untarring"
        );
        self.runner.run(&self.invocation(source, destination)).await
    }
}
