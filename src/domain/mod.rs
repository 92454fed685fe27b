//! Domain types for artifact preparation.
//!
//! - Artifact: external (downloaded) and embedded (inline) descriptors
//! - Checksum: declared content hashes

pub mod artifact;

// Re-export commonly used types
pub use artifact::{
    validate_filename, Artifact, Checksum, ChecksumAlgorithm, EmbeddedArtifact, ExternalArtifact,
};
