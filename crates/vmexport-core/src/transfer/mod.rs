//! Resilient transfer layer
//!
//! Every provider's download step goes through [`Transfer::download`], which
//! layers progress reporting, checkpoint-based resumption and bandwidth
//! throttling over a [`ByteSource`]. The layer only reports failures as
//! [`TransferError`]s; whether a failure aborts the export is decided by the
//! caller.

mod checkpoint;
mod progress;
mod source;
mod throttle;

pub use checkpoint::{CHECKPOINT_VERSION, Checkpoint};
pub use progress::{ProgressCallback, ProgressReporter, ProgressSink, ProgressUpdate};
pub use source::{ByteSource, HttpSource, MemorySource, SourceStream};
pub use throttle::{BandwidthLimiter, MIN_DEFAULT_BURST};

use crate::cancel::CancelToken;
use crate::error::TransferError;
use futures_util::StreamExt;
use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio::time::Instant;

/// Throttling and checkpoint settings for a transfer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOptions {
    /// Bytes per second; 0 = unlimited
    pub bandwidth_limit: u64,
    /// Bucket size in bytes; 0 = max(limit / 10, 64 KiB)
    pub bandwidth_burst: u64,
    pub enable_checkpoints: bool,
    /// 0 = save only when the transfer stops
    pub checkpoint_interval: Duration,
    pub resume_from_checkpoint: bool,
    /// Directory for checkpoint files; defaults to the target's directory
    pub checkpoint_dir: Option<PathBuf>,
}

/// Position of a file within a multi-file export, for progress display
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub name: String,
    /// 1-based
    pub index: usize,
    pub total: usize,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, index: usize, total: usize) -> Self {
        Self {
            name: name.into(),
            index,
            total,
        }
    }
}

/// Download driver shared by all disks of one export
///
/// Clones share the same bandwidth limiter, so concurrent disk downloads are
/// throttled as a whole.
#[derive(Clone, Default)]
pub struct Transfer {
    options: TransferOptions,
    limiter: Option<Arc<BandwidthLimiter>>,
    progress: ProgressSink,
}

async fn until_cancelled<T>(
    cancel: &CancelToken,
    fut: impl Future<Output = Result<T, TransferError>>,
) -> Result<T, TransferError> {
    if cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransferError::Cancelled),
        res = fut => res,
    }
}

impl Transfer {
    pub fn new(options: TransferOptions, progress: ProgressSink) -> Self {
        let limiter = BandwidthLimiter::new(options.bandwidth_limit, options.bandwidth_burst)
            .map(Arc::new);
        Self {
            options,
            limiter,
            progress,
        }
    }

    pub fn options(&self) -> &TransferOptions {
        &self.options
    }

    pub fn progress(&self) -> &ProgressSink {
        &self.progress
    }

    pub fn checkpoint_path(&self, target: &Path) -> PathBuf {
        Checkpoint::default_path(target, self.options.checkpoint_dir.as_deref())
    }

    /// Resume point from a matching checkpoint, if any
    async fn resume_point(&self, source: &dyn ByteSource, target: &Path) -> Option<Checkpoint> {
        if !(self.options.enable_checkpoints && self.options.resume_from_checkpoint) {
            return None;
        }
        let path = self.checkpoint_path(target);
        let checkpoint = match Checkpoint::load(&path).await {
            Ok(Some(c)) => c,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable checkpoint");
                return None;
            }
        };

        if !checkpoint.matches(target, source.identity()) {
            tracing::info!(target = %target.display(), "Checkpoint belongs to another transfer, starting over");
            return None;
        }
        let on_disk = fs::metadata(target).await.map(|m| m.len()).unwrap_or(0);
        if on_disk < checkpoint.bytes_completed {
            tracing::info!(
                target = %target.display(),
                on_disk,
                expected = checkpoint.bytes_completed,
                "Partial file shorter than checkpoint, starting over"
            );
            return None;
        }
        if checkpoint.is_complete() && checkpoint.total_size != Some(on_disk) {
            tracing::info!(
                target = %target.display(),
                on_disk,
                "Finished checkpoint does not match the file on disk, starting over"
            );
            return None;
        }
        Some(checkpoint)
    }

    /// Checkpoint cleanup never fails a transfer
    async fn discard_checkpoint(&self, path: &Path) {
        if let Err(e) = Checkpoint::delete(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove checkpoint");
        }
    }

    /// Copy `source` into `target`, returning the final file size
    ///
    /// Bytes are written strictly in source order. On any early stop the
    /// checkpoint (when enabled) records how far the file got.
    pub async fn download(
        &self,
        source: &dyn ByteSource,
        target: &Path,
        file: &FileInfo,
        cancel: &CancelToken,
    ) -> Result<u64, TransferError> {
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let checkpoint_path = self.checkpoint_path(target);
        let resume = self.resume_point(source, target).await;

        // Interrupted between the last save and the cleanup
        if let Some(done) = resume.as_ref().filter(|c| c.is_complete()) {
            tracing::info!(
                target = %target.display(),
                bytes = done.bytes_completed,
                "Checkpoint records a finished transfer, skipping download"
            );
            self.discard_checkpoint(&checkpoint_path).await;
            self.progress.start(&file.name, done.total_size);
            self.progress.finish(&file.name);
            return Ok(done.bytes_completed);
        }

        let mut start = resume.as_ref().map(|c| c.bytes_completed).unwrap_or(0);

        let mut opened = match until_cancelled(cancel, source.open(start)).await {
            Err(TransferError::Status { status: 416, .. }) if start > 0 => {
                tracing::info!(
                    source = %source.identity(),
                    offset = start,
                    "Range not satisfiable, restarting from zero"
                );
                start = 0;
                until_cancelled(cancel, source.open(0)).await?
            }
            opened => opened?,
        };

        if start > 0 {
            let total_changed = matches!(
                (resume.as_ref().and_then(|c| c.total_size), opened.total_size),
                (Some(before), Some(now)) if before != now
            );
            if opened.offset != start || total_changed {
                tracing::info!(
                    source = %source.identity(),
                    requested = start,
                    served = opened.offset,
                    "Cannot resume from checkpoint, restarting from zero"
                );
                start = 0;
                if opened.offset != 0 {
                    opened = until_cancelled(cancel, source.open(0)).await?;
                }
            } else {
                tracing::info!(source = %source.identity(), offset = start, "Resuming transfer");
            }
        }

        let total = opened.total_size;
        let mut checkpoint = if self.options.enable_checkpoints {
            let mut c = Checkpoint::new(target, source.identity(), total);
            if let Some(previous) = resume.filter(|_| start > 0) {
                c.created_at = previous.created_at;
            }
            Some(c)
        } else {
            None
        };

        let mut out = if start > 0 {
            let mut f = OpenOptions::new().write(true).open(target).await?;
            f.set_len(start).await?;
            f.seek(SeekFrom::Start(start)).await?;
            f
        } else {
            File::create(target).await?
        };

        self.progress.start(&file.name, total);

        let mut written = start;
        let mut saved_once = false;
        let mut last_save = Instant::now();
        let interval = self.options.checkpoint_interval;

        let copied: Result<(), TransferError> = async {
            let mut stream = opened.stream;
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                    next = stream.next() => next,
                };
                let Some(chunk) = next else { return Ok(()) };
                let chunk = chunk?;

                if let Some(limiter) = &self.limiter {
                    limiter.acquire(chunk.len() as u64, cancel).await?;
                }
                out.write_all(&chunk).await?;
                written += chunk.len() as u64;

                self.progress.report(&ProgressUpdate {
                    current: written,
                    total,
                    file_name: file.name.clone(),
                    file_index: file.index,
                    total_files: file.total,
                });

                if let Some(c) = checkpoint.as_mut() {
                    let due = !interval.is_zero() && last_save.elapsed() >= interval;
                    if !saved_once || due {
                        out.flush().await?;
                        c.save(&checkpoint_path, written).await?;
                        saved_once = true;
                        last_save = Instant::now();
                    }
                }
            }
        }
        .await;

        out.flush().await?;

        let outcome = copied.and_then(|()| match total {
            Some(expected) if expected != written => Err(TransferError::SizeMismatch {
                path: target.to_path_buf(),
                expected,
                actual: written,
            }),
            _ => Ok(()),
        });

        match outcome {
            Ok(()) => {
                out.sync_all().await?;
                if checkpoint.is_some() || self.options.resume_from_checkpoint {
                    self.discard_checkpoint(&checkpoint_path).await;
                }
                self.progress.finish(&file.name);
                tracing::debug!(target = %target.display(), bytes = written, "Transfer complete");
                Ok(written)
            }
            Err(e) => {
                if let Some(c) = checkpoint.as_mut().filter(|_| written > 0) {
                    if let Err(save_err) = c.save(&checkpoint_path, written).await {
                        tracing::warn!(error = %save_err, "Failed to save checkpoint");
                    }
                }
                tracing::debug!(target = %target.display(), bytes = written, error = %e, "Transfer stopped");
                Err(e)
            }
        }
    }
}
