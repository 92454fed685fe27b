//! Core artifact resolution logic.
//!
//! This module contains:
//! - ArtifactManager: cache lookup, download, embedded extraction, untar
//! - verify: size and checksum validation
//! - CacheLock: per-filename download serialization
//! - RetryPolicy: backoff for transient download failures

pub mod cache;
pub mod error;
pub mod lock;
pub mod retry;
pub mod verify;

// Re-export commonly used types
pub use cache::ArtifactManager;
pub use error::{ArtifactError, ErrorKind};
pub use lock::CacheLock;
pub use retry::RetryPolicy;
