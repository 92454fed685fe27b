//! taskprep - Verified artifact cache for task executors
//!
//! Before a workload starts, its executor resolves each declared artifact
//! into a local file whose size and checksum match the declaration, and
//! optionally unpacks it.
//!
//! # Architecture
//!
//! - External artifacts are downloaded into a temporary file in the cache
//!   directory, verified, then atomically renamed into `cache/<filename>`
//! - A valid cache entry is reused; validity is recomputed from disk every time
//! - Embedded artifacts are written directly into a task directory, never
//!   overwriting an existing file
//! - External tools (wget, tar) run with output appended to a per-task log
//!
//! # Modules
//!
//! - `adapters`: External tool integrations (process runner, fetchers, tar)
//! - `core`: Artifact cache, validation, locking, retry
//! - `domain`: Artifact descriptors and checksums
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Fetch into the cache and unpack
//! taskprep fetch --url http://host/app.tar.gz --size 1024 \
//!     --md5 d41d8cd98f00b204e9800998ecf8427e --untar-to /tasks/1
//!
//! # Check whether a cache entry is still valid
//! taskprep check --filename app.tar.gz --size 1024
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use crate::config::ResolvedConfig;
pub use crate::core::{ArtifactError, ArtifactManager, ErrorKind, RetryPolicy};
pub use crate::domain::{Artifact, Checksum, ChecksumAlgorithm, EmbeddedArtifact, ExternalArtifact};
