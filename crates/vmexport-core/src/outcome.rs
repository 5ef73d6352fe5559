//! Per-disk accumulation and the continue/abort decision for multi-disk exports

use crate::error::{ExportError, Result};
use crate::provider::ExportResult;
use futures_util::StreamExt;
use futures_util::stream;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Disk type labels assigned by attachment index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskLabels {
    pub boot: &'static str,
    pub data_prefix: &'static str,
}

impl DiskLabels {
    /// `OS`, `Data-1`, `Data-2`, ...
    pub const AZURE: DiskLabels = DiskLabels {
        boot: "OS",
        data_prefix: "Data",
    };

    /// `boot`, `data-1`, `data-2`, ...
    pub const GCP: DiskLabels = DiskLabels {
        boot: "boot",
        data_prefix: "data",
    };

    pub const AWS: DiskLabels = DiskLabels::GCP;

    pub fn label(&self, index: usize) -> String {
        if index == 0 {
            self.boot.to_string()
        } else {
            format!("{}-{}", self.data_prefix, index)
        }
    }
}

/// Collects per-disk outcomes for one VM
///
/// Recoverable failures are logged and remembered; fatal ones are handed back
/// so the caller stops scheduling further disks.
#[derive(Debug)]
pub struct DiskOutcomes {
    vm: String,
    attempted: usize,
    results: Vec<(usize, ExportResult)>,
    last_error: Option<ExportError>,
}

impl DiskOutcomes {
    pub fn new(vm: impl Into<String>) -> Self {
        Self {
            vm: vm.into(),
            attempted: 0,
            results: Vec::new(),
            last_error: None,
        }
    }

    /// Record the outcome of the disk at attachment `index`
    pub fn record(
        &mut self,
        index: usize,
        disk: &str,
        outcome: Result<ExportResult>,
    ) -> Result<()> {
        self.attempted += 1;
        match outcome {
            Ok(result) => {
                tracing::info!(
                    vm = %self.vm,
                    disk = %disk,
                    bytes = result.size_bytes,
                    "Disk exported"
                );
                self.results.push((index, result));
                Ok(())
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::warn!(vm = %self.vm, disk = %disk, error = %e, "Disk export failed, continuing");
                self.last_error = Some(e);
                Ok(())
            }
        }
    }

    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn succeeded(&self) -> usize {
        self.results.len()
    }

    /// Results in attachment order, or the aggregate failure
    pub fn finish(mut self) -> Result<Vec<ExportResult>> {
        if self.attempted == 0 {
            return Err(ExportError::NoDisks(self.vm));
        }
        if self.results.is_empty() {
            let last_error = self
                .last_error
                .unwrap_or_else(|| ExportError::lifecycle("export", &self.vm, "no disk produced a result"));
            return Err(ExportError::AllDisksFailed {
                vm: self.vm,
                attempted: self.attempted,
                last_error: Box::new(last_error),
            });
        }
        self.results.sort_by_key(|(index, _)| *index);
        Ok(self.results.into_iter().map(|(_, r)| r).collect())
    }
}

/// Drive `export_one` over `disks` with at most `parallelism` in flight
///
/// Output order follows input order regardless of completion order. A disk
/// that has started always runs to completion, so its cleanup (access
/// revocation, temporary object deletion) is never skipped; after a fatal
/// error no new disk is started and the fatal error is returned once the
/// in-flight disks have settled.
pub async fn export_disks<D, F, Fut>(
    vm: &str,
    disks: Vec<D>,
    parallelism: usize,
    export_one: F,
) -> Result<Vec<ExportResult>>
where
    D: AsRef<str>,
    F: Fn(usize, D) -> Fut,
    Fut: Future<Output = Result<ExportResult>>,
{
    let mut outcomes = DiskOutcomes::new(vm);
    let stop = Arc::new(AtomicBool::new(false));
    let mut fatal: Option<ExportError> = None;

    let tasks = disks.into_iter().enumerate().map(|(index, disk)| {
        let stop = Arc::clone(&stop);
        let name = disk.as_ref().to_string();
        let fut = export_one(index, disk);
        async move {
            if stop.load(Ordering::SeqCst) {
                return (index, name, None);
            }
            (index, name, Some(fut.await))
        }
    });

    let mut results = stream::iter(tasks).buffered(parallelism.max(1));
    while let Some((index, name, outcome)) = results.next().await {
        let Some(outcome) = outcome else { continue };
        if fatal.is_some() {
            if let Err(e) = outcome {
                tracing::debug!(vm = %vm, disk = %name, error = %e, "Disk settled after abort");
            }
            continue;
        }
        if let Err(e) = outcomes.record(index, &name, outcome) {
            stop.store(true, Ordering::SeqCst);
            fatal = Some(e);
        }
    }

    match fatal {
        Some(e) => Err(e),
        None => outcomes.finish(),
    }
}
