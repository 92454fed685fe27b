//! Artifact descriptors declared by a task.
//!
//! An artifact is a named file that has to exist on disk before a workload
//! starts. External artifacts are downloaded into the cache; embedded artifacts
//! carry their bytes inline and are written straight into a task directory.

use std::fmt;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

/// Hash function used for a declared checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumAlgorithm {
    /// MD5 (what deploy descriptors historically declare as `md5sum`)
    Md5,

    /// SHA-256
    Sha256,
}

impl Default for ChecksumAlgorithm {
    fn default() -> Self {
        Self::Md5
    }
}

impl ChecksumAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Md5 => "md5",
            Self::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An expected content hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    #[serde(default)]
    pub algorithm: ChecksumAlgorithm,

    /// Hex digest
    pub digest: String,
}

impl Checksum {
    pub fn new(algorithm: ChecksumAlgorithm, digest: impl Into<String>) -> Self {
        Self {
            algorithm,
            digest: digest.into(),
        }
    }

    pub fn md5(digest: impl Into<String>) -> Self {
        Self::new(ChecksumAlgorithm::Md5, digest)
    }

    pub fn sha256(digest: impl Into<String>) -> Self {
        Self::new(ChecksumAlgorithm::Sha256, digest)
    }

    /// Compare against a computed hex digest, ignoring case
    pub fn matches(&self, actual: &str) -> bool {
        self.digest.trim().eq_ignore_ascii_case(actual)
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.digest)
    }
}

/// Capabilities shared by every artifact kind
pub trait Artifact {
    /// Human-readable label for logs and errors
    fn name(&self) -> &str;

    /// File name inside the cache or target directory
    fn filename(&self) -> &str;

    /// Declared size in bytes, if any
    fn filesize(&self) -> Option<u64>;

    /// Declared checksum, if any
    fn checksum(&self) -> Option<&Checksum>;
}

/// An artifact fetched from a remote URI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalArtifact {
    /// Display name (defaults to the filename when empty)
    #[serde(default)]
    pub name: String,

    pub filename: String,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
}

impl ExternalArtifact {
    /// Create an unchecked external artifact
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: String::new(),
            filename: filename.into(),
            url: url.into(),
            filesize: None,
            checksum: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_filesize(mut self, filesize: u64) -> Self {
        self.filesize = Some(filesize);
        self
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }
}

impl Artifact for ExternalArtifact {
    fn name(&self) -> &str {
        if self.name.is_empty() {
            &self.filename
        } else {
            &self.name
        }
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn filesize(&self) -> Option<u64> {
        self.filesize
    }

    fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }
}

/// An artifact whose bytes ship inside the task descriptor
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedArtifact {
    #[serde(default)]
    pub name: String,

    pub filename: String,

    pub content: Vec<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<Checksum>,
}

impl EmbeddedArtifact {
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            name: String::new(),
            filename: filename.into(),
            content: content.into(),
            filesize: None,
            checksum: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_filesize(mut self, filesize: u64) -> Self {
        self.filesize = Some(filesize);
        self
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }
}

// Content can be large; keep it out of debug output
impl fmt::Debug for EmbeddedArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedArtifact")
            .field("name", &self.name)
            .field("filename", &self.filename)
            .field("content_len", &self.content.len())
            .field("filesize", &self.filesize)
            .field("checksum", &self.checksum)
            .finish()
    }
}

impl Artifact for EmbeddedArtifact {
    fn name(&self) -> &str {
        if self.name.is_empty() {
            &self.filename
        } else {
            &self.name
        }
    }

    fn filename(&self) -> &str {
        &self.filename
    }

    fn filesize(&self) -> Option<u64> {
        self.filesize
    }

    fn checksum(&self) -> Option<&Checksum> {
        self.checksum.as_ref()
    }
}

/// Check that a filename is exactly one normal path component.
///
/// Returns a short reason on rejection.
pub fn validate_filename(filename: &str) -> Result<(), &'static str> {
    if filename.is_empty() {
        return Err("filename is empty");
    }
    if filename.contains('/') || filename.contains('\\') {
        return Err("filename contains a path separator");
    }

    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err("filename is not a plain file name"),
    }
}
