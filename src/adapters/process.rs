//! Subprocess execution with output captured to a task log.
//!
//! Every external tool (fetch, archive) goes through a [`CommandRunner`].
//! The default [`ProcessRunner`] spawns the child with stdout and stderr
//! appended to a single log file and waits for it to exit.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// A single external command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Program to execute (looked up on PATH if not absolute)
    pub program: String,

    /// Arguments, in order. Paths are passed through unchanged, not as UTF-8.
    pub args: Vec<OsString>,

    /// Log file receiving merged stdout/stderr
    pub output: PathBuf,

    /// Kill the child if it runs longer than this
    pub timeout: Option<Duration>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            output: output.into(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The full command line, for logs and error messages only
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Failure running an external command
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The command ran and exited unsuccessfully
    #[error("Got exit code {code} while running command `{command}`")]
    NonZeroExit { command: String, code: i32 },

    /// The command could not be started or awaited
    #[error("Failed to run command `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command exceeded its deadline and was killed
    #[error("Command `{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

impl ProcessError {
    pub fn command(&self) -> &str {
        match self {
            Self::NonZeroExit { command, .. }
            | Self::Launch { command, .. }
            | Self::TimedOut { command, .. } => command,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Capability to start an external process and block until it exits
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run to completion. Exit code 0 is `Ok`, anything else is an error.
    async fn run(&self, invocation: &Invocation) -> Result<(), ProcessError>;
}

/// Runs commands as real child processes via tokio
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Open the log file for appending and stamp a header for this command
    fn open_log(path: &Path, command: &str) -> std::io::Result<std::fs::File> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "[{}] $ {}", Utc::now().to_rfc3339(), command)?;
        file.flush()?;
        Ok(file)
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<(), ProcessError> {
        let command = invocation.command_line();
        let launch = |source| ProcessError::Launch {
            command: command.clone(),
            source,
        };

        let stdout = Self::open_log(&invocation.output, &command).map_err(launch)?;
        let stderr = stdout.try_clone().map_err(launch)?;

        debug!(%command, log = %invocation.output.display(), "Spawning process");

        let mut child = Command::new(&invocation.program)
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(launch)?;

        let status = match invocation.timeout {
            Some(limit) => match timeout(limit, child.wait()).await {
                Ok(status) => status.map_err(launch)?,
                Err(_) => {
                    warn!(%command, ?limit, "Process timed out, killing");
                    if let Err(e) = child.kill().await {
                        warn!(%command, error = %e, "Failed to kill timed out process");
                    }
                    return Err(ProcessError::TimedOut {
                        command,
                        timeout: limit,
                    });
                }
            },
            None => child.wait().await.map_err(launch)?,
        };

        if !status.success() {
            // Killed by a signal has no code
            let code = status.code().unwrap_or(-1);
            return Err(ProcessError::NonZeroExit { command, code });
        }

        debug!(%command, "Process finished");
        Ok(())
    }
}
