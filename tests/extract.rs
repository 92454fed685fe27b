//! Extraction Integration Tests
//!
//! Tests for writing embedded artifacts and unpacking tarballs.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use taskprep::adapters::{CommandRunner, Invocation, ProcessError};
use taskprep::{
    ArtifactError, ArtifactManager, Checksum, EmbeddedArtifact, ErrorKind, ResolvedConfig,
};
use tempfile::TempDir;

const SCRIPT: &[u8] = b"#!/bin/sh\nexec ./app --port 8080\n";

/// Runner that fails every command with a fixed exit code
struct ExitCodeRunner {
    code: i32,
    invocations: Mutex<Vec<Invocation>>,
}

#[async_trait]
impl CommandRunner for ExitCodeRunner {
    async fn run(&self, invocation: &Invocation) -> Result<(), ProcessError> {
        self.invocations.lock().unwrap().push(invocation.clone());
        Err(ProcessError::NonZeroExit {
            command: invocation.command_line(),
            code: self.code,
        })
    }
}

fn test_config(temp: &TempDir) -> ResolvedConfig {
    ResolvedConfig::with_dirs(temp.path().join("cache"), temp.path().join("logs"))
}

fn md5_of(bytes: &[u8]) -> String {
    use md5::{Digest, Md5};
    hex::encode(Md5::digest(bytes))
}

fn task_dir(temp: &TempDir) -> std::path::PathBuf {
    let dir = temp.path().join("tasks").join("1");
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[tokio::test]
async fn test_extract_embedded_artifact() {
    let temp = TempDir::new().unwrap();
    let manager = ArtifactManager::new(&test_config(&temp), "task-1").unwrap();
    let dir = task_dir(&temp);

    let artifact = EmbeddedArtifact::new("run.sh", SCRIPT.to_vec())
        .with_checksum(Checksum::md5(md5_of(SCRIPT)));
    let path = manager.extract(&artifact, &dir).await.unwrap();

    assert_eq!(path, dir.join("run.sh"));
    assert_eq!(std::fs::read(&path).unwrap(), SCRIPT);
    // Embedded artifacts never touch the cache
    assert!(!manager.cache_dir().exists());
}

#[tokio::test]
async fn test_extract_never_overwrites() {
    let temp = TempDir::new().unwrap();
    let manager = ArtifactManager::new(&test_config(&temp), "task-1").unwrap();
    let dir = task_dir(&temp);
    std::fs::write(dir.join("run.sh"), "original").unwrap();

    let artifact = EmbeddedArtifact::new("run.sh", SCRIPT.to_vec());
    let err = manager.extract(&artifact, &dir).await.unwrap_err();

    assert!(matches!(err, ArtifactError::AlreadyExists { .. }));
    assert_eq!(err.kind(), ErrorKind::Filesystem);
    assert_eq!(
        std::fs::read_to_string(dir.join("run.sh")).unwrap(),
        "original"
    );
}

#[tokio::test]
async fn test_extract_checksum_mismatch_keeps_file() {
    let temp = TempDir::new().unwrap();
    let manager = ArtifactManager::new(&test_config(&temp), "task-1").unwrap();
    let dir = task_dir(&temp);

    let artifact = EmbeddedArtifact::new("run.sh", SCRIPT.to_vec())
        .with_checksum(Checksum::md5("d41d8cd98f00b204e9800998ecf8427e"));
    let err = manager.extract(&artifact, &dir).await.unwrap_err();

    assert!(matches!(err, ArtifactError::ChecksumMismatch { .. }));
    assert_eq!(std::fs::read(dir.join("run.sh")).unwrap(), SCRIPT);
}

#[tokio::test]
async fn test_extract_size_mismatch() {
    let temp = TempDir::new().unwrap();
    let manager = ArtifactManager::new(&test_config(&temp), "task-1").unwrap();
    let dir = task_dir(&temp);

    let artifact = EmbeddedArtifact::new("run.sh", SCRIPT.to_vec()).with_filesize(1);
    let err = manager.extract(&artifact, &dir).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Integrity);
}

#[tokio::test]
async fn test_extract_into_missing_directory_fails() {
    let temp = TempDir::new().unwrap();
    let manager = ArtifactManager::new(&test_config(&temp), "task-1").unwrap();

    let artifact = EmbeddedArtifact::new("run.sh", SCRIPT.to_vec());
    let err = manager
        .extract(&artifact, &temp.path().join("missing"))
        .await
        .unwrap_err();

    assert!(matches!(err, ArtifactError::Filesystem { .. }));
}

#[tokio::test]
async fn test_extract_rejects_path_in_filename() {
    let temp = TempDir::new().unwrap();
    let manager = ArtifactManager::new(&test_config(&temp), "task-1").unwrap();
    let dir = task_dir(&temp);

    let artifact = EmbeddedArtifact::new("../run.sh", SCRIPT.to_vec());
    let err = manager.extract(&artifact, &dir).await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidArtifact);
    assert!(!dir.parent().unwrap().join("run.sh").exists());
}

#[tokio::test]
async fn test_untar_failure_reports_exit_code_and_command() {
    let temp = TempDir::new().unwrap();
    let runner = Arc::new(ExitCodeRunner {
        code: 2,
        invocations: Mutex::new(Vec::new()),
    });
    let manager =
        ArtifactManager::with_runner(&test_config(&temp), "task-1", runner.clone()).unwrap();

    let archive = manager.cached_path("app.tar.gz").unwrap();
    let dir = Path::new("/tasks/1");
    let err = manager.untar(&archive, dir).await.unwrap_err();

    let expected_command = format!("tar -oxzf {} -C /tasks/1", archive.display());
    match &err {
        ArtifactError::ExtractionFailed { code, command, .. } => {
            assert_eq!(*code, 2);
            assert_eq!(command, &expected_command);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Extraction);
    assert_eq!(runner.invocations.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_untar_real_archive() {
    let temp = TempDir::new().unwrap();
    let manager = ArtifactManager::new(&test_config(&temp), "task-1").unwrap();
    let dir = task_dir(&temp);

    let src = temp.path().join("src");
    std::fs::create_dir_all(src.join("bin")).unwrap();
    std::fs::write(src.join("bin").join("app"), "binary").unwrap();
    std::fs::write(dir.join("stale.txt"), "keep me").unwrap();

    let archive = temp.path().join("app.tar.gz");
    let status = std::process::Command::new("tar")
        .arg("-czf")
        .arg(&archive)
        .arg("-C")
        .arg(&src)
        .arg("bin")
        .status()
        .unwrap();
    assert!(status.success());

    manager.untar(&archive, &dir).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.join("bin").join("app")).unwrap(),
        "binary"
    );
    assert_eq!(
        std::fs::read_to_string(dir.join("stale.txt")).unwrap(),
        "keep me"
    );
    assert!(manager.log_path().exists());
}

#[tokio::test]
async fn test_untar_with_missing_tool() {
    let temp = TempDir::new().unwrap();
    let mut config = test_config(&temp);
    config.tools.tar_path = "/nonexistent/taskprep/tar".to_string();
    let manager = ArtifactManager::new(&config, "task-1").unwrap();

    let err = manager
        .untar(&temp.path().join("app.tar.gz"), temp.path())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ProcessLaunch);
    assert_eq!(err.exit_code(), None);
}
