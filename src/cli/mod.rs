//! Command-line interface for taskprep.
//!
//! Provides commands for fetching artifacts into the cache, writing
//! embedded artifacts, unpacking archives and inspecting the cache.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::config::{self, ResolvedConfig};
use crate::core::{verify, ArtifactManager};
use crate::domain::{Checksum, ChecksumAlgorithm, EmbeddedArtifact, ExternalArtifact};

/// taskprep - Verified artifact cache for task executors
#[derive(Parser, Debug)]
#[command(name = "taskprep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (default: search for .taskprep/config.yaml)
    #[arg(long, global = true, env = "TASKPREP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Task ID used to name the tool output log (default: random)
    #[arg(long, global = true)]
    pub task_id: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch an artifact into the cache, downloading only on a miss
    Fetch {
        /// Source URL
        #[arg(long)]
        url: String,

        /// Cache filename (defaults to the last URL path segment)
        #[arg(long)]
        filename: Option<String>,

        /// Expected size in bytes
        #[arg(long)]
        size: Option<u64>,

        #[command(flatten)]
        checksum: ChecksumArgs,

        /// Unpack the fetched tarball into this directory
        #[arg(long)]
        untar_to: Option<PathBuf>,
    },

    /// Write a local file into a directory as an embedded artifact
    Embed {
        /// File whose bytes become the artifact content
        source: PathBuf,

        /// Target directory
        directory: PathBuf,

        /// Target filename (defaults to the source filename)
        #[arg(long)]
        filename: Option<String>,

        #[command(flatten)]
        checksum: ChecksumArgs,
    },

    /// Unpack a gzipped tarball into an existing directory
    Untar {
        archive: PathBuf,
        directory: PathBuf,
    },

    /// Report whether a cache entry is present and valid
    Check {
        #[arg(long)]
        filename: String,

        /// Expected size in bytes
        #[arg(long)]
        size: Option<u64>,

        #[command(flatten)]
        checksum: ChecksumArgs,
    },

    /// Print md5 and sha256 of a file
    Hash { file: PathBuf },

    /// Show resolved configuration (debug)
    Config,
}

/// Expected checksum flags
#[derive(Args, Debug, Clone, Default)]
pub struct ChecksumArgs {
    /// Expected MD5 hex digest
    #[arg(long, conflicts_with = "sha256")]
    pub md5: Option<String>,

    /// Expected SHA-256 hex digest
    #[arg(long)]
    pub sha256: Option<String>,
}

impl ChecksumArgs {
    pub fn to_checksum(&self) -> Option<Checksum> {
        match (&self.md5, &self.sha256) {
            (Some(md5), _) => Some(Checksum::md5(md5.clone())),
            (None, Some(sha256)) => Some(Checksum::sha256(sha256.clone())),
            (None, None) => None,
        }
    }
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(self) -> Result<()> {
        let config = match self.config {
            Some(ref path) => config::load_config_from(path)?,
            None => config::load_config()?,
        };
        let task_id = self
            .task_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match self.command {
            Commands::Fetch {
                url,
                filename,
                size,
                checksum,
                untar_to,
            } => fetch(&config, &task_id, url, filename, size, &checksum, untar_to).await,
            Commands::Embed {
                source,
                directory,
                filename,
                checksum,
            } => embed(&config, &task_id, &source, &directory, filename, &checksum).await,
            Commands::Untar { archive, directory } => {
                untar(&config, &task_id, &archive, &directory).await
            }
            Commands::Check {
                filename,
                size,
                checksum,
            } => check(&config, &task_id, filename, size, &checksum).await,
            Commands::Hash { file } => hash(&file).await,
            Commands::Config => show_config(&config),
        }
    }
}

/// Last non-empty path segment of a URL, ignoring query and fragment
fn filename_from_url(url: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let without_scheme = without_query
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(without_query);

    // Drop the host
    let path = without_scheme.split_once('/').map(|(_, p)| p)?;
    path.rsplit('/')
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

async fn fetch(
    config: &ResolvedConfig,
    task_id: &str,
    url: String,
    filename: Option<String>,
    size: Option<u64>,
    checksum: &ChecksumArgs,
    untar_to: Option<PathBuf>,
) -> Result<()> {
    let filename = match filename.or_else(|| filename_from_url(&url)) {
        Some(name) => name,
        None => anyhow::bail!("Cannot derive a filename from {}; pass --filename", url),
    };

    let mut artifact = ExternalArtifact::new(filename, url);
    artifact.filesize = size;
    artifact.checksum = checksum.to_checksum();

    let manager = ArtifactManager::new(config, task_id)?;
    let path = manager
        .fetch(&artifact)
        .await
        .with_context(|| format!("Failed to fetch {}", artifact.url))?;

    if let Some(directory) = untar_to {
        manager.untar(&path, &directory).await?;
        eprintln!("Unpacked {} into {}", path.display(), directory.display());
    }

    println!("{}", path.display());
    Ok(())
}

async fn embed(
    config: &ResolvedConfig,
    task_id: &str,
    source: &Path,
    directory: &Path,
    filename: Option<String>,
    checksum: &ChecksumArgs,
) -> Result<()> {
    let content = tokio::fs::read(source)
        .await
        .with_context(|| format!("Failed to read {}", source.display()))?;

    let filename = match filename {
        Some(name) => name,
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("No filename in {}", source.display()))?,
    };

    let mut artifact = EmbeddedArtifact::new(filename, content);
    artifact.checksum = checksum.to_checksum();

    let manager = ArtifactManager::new(config, task_id)?;
    let path = manager.extract(&artifact, directory).await?;

    println!("{}", path.display());
    Ok(())
}

async fn untar(config: &ResolvedConfig, task_id: &str, archive: &Path, directory: &Path) -> Result<()> {
    let manager = ArtifactManager::new(config, task_id)?;
    manager.untar(archive, directory).await?;

    eprintln!("Unpacked {} into {}", archive.display(), directory.display());
    Ok(())
}

async fn check(
    config: &ResolvedConfig,
    task_id: &str,
    filename: String,
    size: Option<u64>,
    checksum: &ChecksumArgs,
) -> Result<()> {
    let mut artifact = ExternalArtifact::new(filename, "");
    artifact.filesize = size;
    artifact.checksum = checksum.to_checksum();

    let manager = ArtifactManager::new(config, task_id)?;
    let path = manager.cached_path(&artifact.filename)?;

    if manager.is_cached(&artifact).await? {
        println!("valid   {}", path.display());
    } else {
        println!("invalid {}", path.display());
        std::process::exit(1);
    }

    Ok(())
}

async fn hash(file: &Path) -> Result<()> {
    let size = verify::file_size(file).await?;
    let md5 = verify::compute_checksum(file, ChecksumAlgorithm::Md5).await?;
    let sha256 = verify::compute_checksum(file, ChecksumAlgorithm::Sha256).await?;

    println!("size:   {}", size);
    println!("md5:    {}", md5);
    println!("sha256: {}", sha256);
    Ok(())
}

fn show_config(config: &ResolvedConfig) -> Result<()> {
    println!("taskprep configuration");
    println!();
    match config.config_file {
        Some(ref path) => println!("  Config file: {}", path.display()),
        None => println!("  Config file: (none, using defaults)"),
    }
    println!("  Cache dir:   {}", config.cache_dir.display());
    println!("  Log dir:     {}", config.log_dir.display());
    println!("  Fetch with:  {:?}", config.tools.fetch_backend);
    println!("  wget:        {}", config.tools.wget_path);
    println!("  tar:         {}", config.tools.tar_path);
    match config.tools.command_timeout_seconds {
        Some(secs) => println!("  Timeout:     {}s", secs),
        None => println!("  Timeout:     none"),
    }
    println!(
        "  Retry:       {} attempts, {}ms initial delay",
        config.retry.max_attempts, config.retry.initial_delay_ms
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_url() {
        assert_eq!(
            filename_from_url("http://host/app.tar.gz"),
            Some("app.tar.gz".to_string())
        );
        assert_eq!(
            filename_from_url("https://host/dist/app.tar.gz?token=abc#frag"),
            Some("app.tar.gz".to_string())
        );
        assert_eq!(
            filename_from_url("https://host/dist/"),
            Some("dist".to_string())
        );
        assert_eq!(filename_from_url("https://host"), None);
    }

    #[test]
    fn test_checksum_args() {
        let args = ChecksumArgs {
            md5: Some("abc".to_string()),
            sha256: None,
        };
        assert_eq!(args.to_checksum(), Some(Checksum::md5("abc")));

        let args = ChecksumArgs {
            md5: None,
            sha256: Some("def".to_string()),
        };
        assert_eq!(args.to_checksum(), Some(Checksum::sha256("def")));

        assert_eq!(ChecksumArgs::default().to_checksum(), None);
    }

    #[test]
    fn test_cli_parses_fetch() {
        let cli = Cli::try_parse_from([
            "taskprep",
            "--task-id",
            "t1",
            "fetch",
            "--url",
            "http://host/app.tar.gz",
            "--size",
            "1024",
            "--md5",
            "d41d8cd98f00b204e9800998ecf8427e",
        ])
        .unwrap();

        assert_eq!(cli.task_id.as_deref(), Some("t1"));
        match cli.command {
            Commands::Fetch { url, size, checksum, .. } => {
                assert_eq!(url, "http://host/app.tar.gz");
                assert_eq!(size, Some(1024));
                assert!(checksum.md5.is_some());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_both_checksums() {
        let result = Cli::try_parse_from([
            "taskprep", "check", "--filename", "a", "--md5", "x", "--sha256", "y",
        ]);
        assert!(result.is_err());
    }
}
