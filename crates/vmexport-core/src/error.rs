//! Export engine error types

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by providers and the export engine
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Provider not connected")]
    NotConnected,

    #[error("Unknown provider type: {0}")]
    UnknownProvider(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid export options: {0}")]
    InvalidOptions(String),

    #[error("VM not found: {0}")]
    VmNotFound(String),

    #[error("VM {0} has no attached disks")]
    NoDisks(String),

    #[error("Failed to export any of the {attempted} disks of VM {vm}: {last_error}")]
    AllDisksFailed {
        vm: String,
        attempted: usize,
        last_error: Box<ExportError>,
    },

    #[error("{step} failed for {resource}: {message}")]
    Lifecycle {
        step: &'static str,
        resource: String,
        message: String,
    },

    #[error("Command execution failed: {0}")]
    CommandFailed(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Export cancelled")]
    Cancelled,

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExportError {
    /// Whether this error must abort the whole VM export instead of just the
    /// disk it happened on.
    pub fn is_fatal(&self) -> bool {
        match self {
            ExportError::NotConnected
            | ExportError::Connection(_)
            | ExportError::Authentication(_)
            | ExportError::InvalidOptions(_)
            | ExportError::Cancelled => true,
            ExportError::Transfer(e) => e.is_cancelled(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            ExportError::Cancelled => true,
            ExportError::Transfer(e) => e.is_cancelled(),
            _ => false,
        }
    }

    pub fn lifecycle(
        step: &'static str,
        resource: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        ExportError::Lifecycle {
            step,
            resource: resource.into(),
            message: message.to_string(),
        }
    }
}

/// Errors raised by the transfer layer
///
/// The transfer layer never decides whether a failure is fatal for the export;
/// it only reports what went wrong.
#[derive(Error, Debug)]
pub enum TransferError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Source stream error: {0}")]
    Source(String),

    #[error("Incomplete transfer of {path}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransferError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(ExportError::Cancelled.is_fatal());
        assert!(ExportError::Transfer(TransferError::Cancelled).is_fatal());
        assert!(ExportError::Authentication("expired".into()).is_fatal());
        assert!(!ExportError::lifecycle("grant access", "disk-1", "boom").is_fatal());
        assert!(!ExportError::Transfer(TransferError::Source("reset".into())).is_fatal());
    }

    #[test]
    fn test_all_disks_failed_message_carries_cause() {
        let err = ExportError::AllDisksFailed {
            vm: "web-01".into(),
            attempted: 2,
            last_error: Box::new(ExportError::lifecycle("download", "disk-2", "reset")),
        };
        let msg = err.to_string();
        assert!(msg.contains("web-01"));
        assert!(msg.contains("download failed for disk-2"));
    }
}
