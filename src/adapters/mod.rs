//! Adapters for the external tools artifact preparation delegates to.
//!
//! - process: run a command with output captured to the task log
//! - fetch: download a URI (wget or native HTTP)
//! - archive: unpack a tarball with tar

pub mod archive;
pub mod fetch;
pub mod process;

// Re-export the adapter types
pub use archive::TarExtractor;
pub use fetch::{FetchBackend, FetchError, Fetcher, HttpFetcher, WgetFetcher};
pub use process::{CommandRunner, Invocation, ProcessError, ProcessRunner};
