//! External dataset host
//!
//! The host receives a local folder (the CSV files plus
//! `dataset-metadata.json`) and a human-readable version note.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use t20i_common::{PipelineError, Result};
use tokio::process::Command;
use tracing::{info, instrument};

use crate::config::KaggleConfig;

/// Name of the metadata file the host reads from the export folder
pub const DATASET_METADATA_FILE: &str = "dataset-metadata.json";

#[async_trait]
pub trait DatasetHost: Send + Sync {
    async fn publish_version(&self, folder: &Path, version_note: &str) -> Result<()>;
}

/// Publishes through the `kaggle` command-line client
pub struct KaggleCli {
    program: String,
    config: KaggleConfig,
}

impl KaggleCli {
    pub fn new(config: KaggleConfig) -> Self {
        Self {
            program: "kaggle".to_string(),
            config,
        }
    }

    /// Use a different executable (a wrapper script, or a stub in tests)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl DatasetHost for KaggleCli {
    #[instrument(skip(self))]
    async fn publish_version(&self, folder: &Path, version_note: &str) -> Result<()> {
        let output = Command::new(&self.program)
            .args(["datasets", "version", "-p"])
            .arg(folder)
            .args(["-m", version_note, "--delete-old-versions"])
            .env("KAGGLE_USERNAME", &self.config.username)
            .env("KAGGLE_KEY", &self.config.key)
            .output()
            .await
            .map_err(|e| {
                PipelineError::transient(format!("Failed to run {}: {}", self.program, e))
            })?;

        if !output.status.success() {
            return Err(PipelineError::TransientIo(format!(
                "Dataset upload failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        info!(dataset = %self.config.dataset_id(), "Dataset version published");
        Ok(())
    }
}

/// Copies each published folder into `root/v<N>/`, with the note alongside
pub struct LocalDirectoryHost {
    root: PathBuf,
}

impl LocalDirectoryHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Published versions, oldest first
    pub async fn versions(&self) -> Result<Vec<PathBuf>> {
        let mut versions: Vec<(u32, PathBuf)> = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(n) = name.strip_prefix('v').and_then(|n| n.parse::<u32>().ok()) {
                versions.push((n, entry.path()));
            }
        }

        versions.sort();
        Ok(versions.into_iter().map(|(_, path)| path).collect())
    }
}

#[async_trait]
impl DatasetHost for LocalDirectoryHost {
    async fn publish_version(&self, folder: &Path, version_note: &str) -> Result<()> {
        let next = self.versions().await?.len() + 1;
        let target = self.root.join(format!("v{}", next));
        tokio::fs::create_dir_all(&target).await?;

        let mut entries = tokio::fs::read_dir(folder).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::copy(entry.path(), target.join(entry.file_name())).await?;
            }
        }
        tokio::fs::write(target.join("VERSION_NOTE.txt"), version_note).await?;

        info!(version = %target.display(), "Dataset version stored locally");
        Ok(())
    }
}
