//! Persisted transfer state for resumable downloads

use crate::error::TransferError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

pub const CHECKPOINT_VERSION: &str = "1.0";

/// Progress of one in-flight transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub version: String,
    pub target_path: PathBuf,

    /// Stable identity of the byte source (never a signed URL)
    pub source: String,
    pub total_size: Option<u64>,
    pub bytes_completed: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(target_path: impl Into<PathBuf>, source: impl Into<String>, total_size: Option<u64>) -> Self {
        let now = Utc::now();
        Self {
            version: CHECKPOINT_VERSION.to_string(),
            target_path: target_path.into(),
            source: source.into(),
            total_size,
            bytes_completed: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// `<dir>/.<file name>.checkpoint`, where `dir` defaults to the target's
    /// directory
    pub fn default_path(target: &Path, dir: Option<&Path>) -> PathBuf {
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "transfer".to_string());
        let dir = dir
            .map(Path::to_path_buf)
            .or_else(|| target.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        dir.join(format!(".{}.checkpoint", file_name))
    }

    /// Whether this checkpoint describes a transfer of `source` into `target`
    pub fn matches(&self, target: &Path, source: &str) -> bool {
        self.version == CHECKPOINT_VERSION && self.target_path == target && self.source == source
    }

    pub fn is_complete(&self) -> bool {
        self.total_size
            .is_some_and(|total| self.bytes_completed >= total)
    }

    /// `Ok(None)` when no checkpoint exists
    pub async fn load(path: &Path) -> Result<Option<Self>, TransferError> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| TransferError::Checkpoint(format!("{}: {}", path.display(), e)))
    }

    /// Write atomically through a temporary file and rename
    pub async fn save(&mut self, path: &Path, bytes_completed: u64) -> Result<(), TransferError> {
        self.bytes_completed = bytes_completed;
        self.updated_at = Utc::now();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| TransferError::Checkpoint(e.to_string()))?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, content).await?;
        fs::rename(&tmp, path).await?;

        tracing::debug!(path = %path.display(), bytes = bytes_completed, "Saved checkpoint");
        Ok(())
    }

    /// Remove a checkpoint; a missing file is not an error
    pub async fn delete(path: &Path) -> Result<(), TransferError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
