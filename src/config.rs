//! Configuration for taskprep.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (TASKPREP_CACHE_DIR, TASKPREP_LOG_DIR)
//! 2. Config file (.taskprep/config.yaml)
//! 3. Defaults (~/.taskprep/cache, ~/.taskprep/logs)
//!
//! Config file discovery:
//! - Searches current directory and parents for .taskprep/config.yaml
//! - Paths in config file are relative to the project root (the parent of .taskprep/)
//!
//! The resolved value is handed to [`crate::ArtifactManager`] explicitly;
//! there is no global.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::FetchBackend;
use crate::core::RetryPolicy;

/// Environment variable overriding the cache directory
pub const ENV_CACHE_DIR: &str = "TASKPREP_CACHE_DIR";

/// Environment variable overriding the task log directory
pub const ENV_LOG_DIR: &str = "TASKPREP_LOG_DIR";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub tools: Option<ToolsConfig>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PathsConfig {
    /// Artifact cache directory
    pub cache: Option<String>,
    /// Per-task log directory
    pub logs: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ToolsConfig {
    pub fetch_backend: Option<FetchBackend>,
    pub wget: Option<String>,
    pub tar: Option<String>,
    pub command_timeout_seconds: Option<u64>,
}

/// Resolved configuration with absolute paths
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Where fetched artifacts are cached, keyed by filename
    pub cache_dir: PathBuf,
    /// Where per-task tool output logs go
    pub log_dir: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
    /// External tool settings
    pub tools: ToolSettings,
    /// Download retry policy
    pub retry: RetryPolicy,
}

#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub fetch_backend: FetchBackend,
    pub wget_path: String,
    pub tar_path: String,
    /// Kill external tools after this long (None = wait forever)
    pub command_timeout_seconds: Option<u64>,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            fetch_backend: FetchBackend::Wget,
            wget_path: "wget".to_string(),
            tar_path: "tar".to_string(),
            command_timeout_seconds: Some(3600),
        }
    }
}

impl ToolSettings {
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_seconds.map(Duration::from_secs)
    }

    fn merge(mut self, file: Option<&ToolsConfig>) -> Self {
        if let Some(tools) = file {
            if let Some(backend) = tools.fetch_backend {
                self.fetch_backend = backend;
            }
            if let Some(ref wget) = tools.wget {
                self.wget_path = wget.clone();
            }
            if let Some(ref tar) = tools.tar {
                self.tar_path = tar.clone();
            }
            if tools.command_timeout_seconds.is_some() {
                self.command_timeout_seconds = tools.command_timeout_seconds;
            }
        }
        self
    }
}

impl ResolvedConfig {
    /// Configuration with explicit directories and default tool settings
    pub fn with_dirs(cache_dir: impl Into<PathBuf>, log_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            log_dir: log_dir.into(),
            config_file: None,
            tools: ToolSettings::default(),
            retry: RetryPolicy::default(),
        }
    }

    /// Log file receiving external tool output for a task
    pub fn task_log_path(&self, task_id: &str) -> PathBuf {
        self.log_dir.join(format!("{}.log", task_id))
    }
}

/// Find config file by searching a directory and its parents
fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(".taskprep").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's project root
fn resolve_path(base: &Path, path_str: &str) -> PathBuf {
    let path = PathBuf::from(path_str);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
            .canonicalize()
            .unwrap_or_else(|_| base.join(path_str))
    }
}

/// Resolve configuration from an optional config file plus env overrides
fn resolve(
    config_file: Option<PathBuf>,
    env_cache: Option<PathBuf>,
    env_logs: Option<PathBuf>,
    default_home: &Path,
) -> Result<ResolvedConfig> {
    let file = match config_file {
        Some(ref path) => Some(load_config_file(path)?),
        None => None,
    };

    // Base directory is the parent of .taskprep/ (i.e., grandparent of config.yaml)
    let base_dir = config_file
        .as_deref()
        .and_then(|p| p.parent())
        .and_then(|p| p.parent())
        .unwrap_or(Path::new("."));

    let paths = file.as_ref().map(|f| f.paths.clone()).unwrap_or_default();

    let cache_dir = env_cache
        .or_else(|| paths.cache.as_deref().map(|p| resolve_path(base_dir, p)))
        .unwrap_or_else(|| default_home.join("cache"));

    let log_dir = env_logs
        .or_else(|| paths.logs.as_deref().map(|p| resolve_path(base_dir, p)))
        .unwrap_or_else(|| default_home.join("logs"));

    let tools = ToolSettings::default().merge(file.as_ref().and_then(|f| f.tools.as_ref()));
    let retry = file
        .as_ref()
        .and_then(|f| f.retry.clone())
        .unwrap_or_default();

    Ok(ResolvedConfig {
        cache_dir,
        log_dir,
        config_file,
        tools,
        retry,
    })
}

/// Load configuration from all sources
pub fn load_config() -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".taskprep");

    let cwd = std::env::current_dir().context("Failed to determine current directory")?;

    resolve(
        find_config_file(&cwd),
        std::env::var_os(ENV_CACHE_DIR).map(PathBuf::from),
        std::env::var_os(ENV_LOG_DIR).map(PathBuf::from),
        &default_home,
    )
}

/// Load configuration from a specific file, still honoring env overrides
pub fn load_config_from(path: &Path) -> Result<ResolvedConfig> {
    let default_home = dirs::home_dir()
        .context("Failed to determine home directory")?
        .join(".taskprep");

    resolve(
        Some(path.to_path_buf()),
        std::env::var_os(ENV_CACHE_DIR).map(PathBuf::from),
        std::env::var_os(ENV_LOG_DIR).map(PathBuf::from),
        &default_home,
    )
}
