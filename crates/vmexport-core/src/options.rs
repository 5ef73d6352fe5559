//! Export options shared by every provider

use crate::error::{ExportError, Result};
use crate::metadata::{Metadata, MetadataExt};
use crate::provider::ExportCapabilities;
use crate::transfer::{ProgressCallback, ProgressReporter, ProgressSink, TransferOptions};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Upper bound on concurrently exported disks
pub const MAX_PARALLEL_DISKS: usize = 16;

/// Caller-facing export request
///
/// Format-specific knobs travel in `metadata` and are projected by each
/// provider into its own typed options struct. Everything that cannot be
/// serialized lives in a typed slot.
#[derive(Clone, Default)]
pub struct ExportOptions {
    /// Directory that receives disk images, manifest and metadata file
    pub output_path: PathBuf,

    /// Target format; empty selects the provider default
    pub format: String,
    /// Rejected by providers without compression support
    pub compress: bool,
    /// Rejected by providers without snapshot support. The cloud backends
    /// always export a point-in-time copy of each disk.
    pub include_snapshots: bool,
    /// Exported cloud disk images never carry optical drives, so the cloud
    /// backends always satisfy this
    pub remove_cdrom: bool,

    /// Disks exported concurrently; 0 and 1 both mean sequential
    pub parallel_disks: usize,

    pub metadata: Metadata,
    pub progress_callback: Option<ProgressCallback>,
    pub progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

impl ExportOptions {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            ..Default::default()
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Effective disk concurrency, at least 1
    pub fn parallelism(&self) -> usize {
        self.parallel_disks.clamp(1, MAX_PARALLEL_DISKS)
    }

    /// Checks shared by every provider
    pub fn validate(&self) -> Result<()> {
        if self.parallel_disks > MAX_PARALLEL_DISKS {
            return Err(ExportError::InvalidOptions(format!(
                "parallel_disks must be at most {}, got {}",
                MAX_PARALLEL_DISKS, self.parallel_disks
            )));
        }
        self.transfer_options().map(|_| ())
    }

    /// Reject requests the provider cannot honor
    pub fn check_capabilities(&self, capabilities: &ExportCapabilities) -> Result<()> {
        if self.compress && !capabilities.supports_compression {
            return Err(ExportError::InvalidOptions(
                "compression is not supported by this provider".into(),
            ));
        }
        if self.include_snapshots && !capabilities.supports_snapshots {
            return Err(ExportError::InvalidOptions(
                "snapshot export is not supported by this provider".into(),
            ));
        }
        Ok(())
    }

    /// Project the transfer-related metadata keys
    ///
    /// Recognised keys: `bandwidth_limit`, `bandwidth_burst` (bytes/s, bytes),
    /// `enable_checkpoints`, `checkpoint_interval_secs`,
    /// `resume_from_checkpoint` and `checkpoint_path` (directory).
    pub fn transfer_options(&self) -> Result<TransferOptions> {
        let meta = &self.metadata;
        Ok(TransferOptions {
            bandwidth_limit: meta.get_u64_or("bandwidth_limit", 0)?,
            bandwidth_burst: meta.get_u64_or("bandwidth_burst", 0)?,
            enable_checkpoints: meta.get_bool_or("enable_checkpoints", false)?,
            checkpoint_interval: meta
                .get_secs_or("checkpoint_interval_secs", Duration::ZERO)?,
            resume_from_checkpoint: meta.get_bool_or("resume_from_checkpoint", false)?,
            checkpoint_dir: meta.get_as::<PathBuf>("checkpoint_path")?,
        })
    }

    pub fn progress_sink(&self) -> ProgressSink {
        ProgressSink::new(
            self.progress_callback.clone(),
            self.progress_reporter.clone(),
        )
    }
}

impl fmt::Debug for ExportOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExportOptions")
            .field("output_path", &self.output_path)
            .field("format", &self.format)
            .field("compress", &self.compress)
            .field("include_snapshots", &self.include_snapshots)
            .field("remove_cdrom", &self.remove_cdrom)
            .field("parallel_disks", &self.parallel_disks)
            .field("metadata", &self.metadata)
            .field("progress_callback", &self.progress_callback.is_some())
            .field("progress_reporter", &self.progress_reporter.is_some())
            .finish()
    }
}
