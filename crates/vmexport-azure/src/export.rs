//! Azure VHD export state machine
//!
//! discover disks → deallocate → generalize → per disk:
//! grant SAS → [copy to blob] → download → revoke

use crate::api::{AzDisk, AzVm, AzureApi, BlobCopyState};
use crate::az::{blob_url, strip_sas};
use crate::options::{AzureExportOptions, AzureFormat, COPY_POLL_INTERVAL, COPY_TIMEOUT};
use chrono::Utc;
use std::path::PathBuf;
use std::time::Duration;
use vmexport_core::transfer::FileInfo;
use vmexport_core::{
    CancelToken, DiskLabels, ExportError, ExportResult, Poll, PollConfig, ProviderType, Result,
    Transfer, export_disks, poll_until,
};

/// Upper bound for a revoke call; it runs even after cancellation
const REVOKE_TIMEOUT: Duration = Duration::from_secs(300);

pub async fn export_vm(
    api: &dyn AzureApi,
    vm: &AzVm,
    opts: &AzureExportOptions,
    transfer: &Transfer,
    cancel: &CancelToken,
) -> Result<Vec<ExportResult>> {
    let disks = vm.disks();
    if opts.format == AzureFormat::Vhd && disks.is_empty() {
        return Err(ExportError::NoDisks(vm.name.clone()));
    }

    tracing::info!(vm = %vm.name, format = opts.format.as_str(), disks = disks.len(), "Starting Azure export");
    prepare_vm(api, vm, opts, transfer, cancel).await?;

    let results = match opts.format {
        AzureFormat::Image => export_image(api, vm, cancel).await?,
        AzureFormat::Vhd => {
            let total = disks.len();
            export_disks(&vm.name, disks, opts.parallel_disks, |index, disk| {
                export_disk(api, disk, index, total, opts, transfer, cancel)
            })
            .await?
        }
    };

    tracing::info!(vm = %vm.name, disks_exported = results.len(), "Azure export complete");
    Ok(results)
}

async fn prepare_vm(
    api: &dyn AzureApi,
    vm: &AzVm,
    opts: &AzureExportOptions,
    transfer: &Transfer,
    cancel: &CancelToken,
) -> Result<()> {
    if opts.deallocate {
        transfer.progress().describe(&format!("Deallocating {}", vm.name));
        tracing::info!(vm = %vm.name, "Deallocating VM");
        cancel.step("deallocate", &vm.name, api.deallocate_vm(vm)).await?;
    }
    if opts.generalize {
        transfer.progress().describe(&format!("Generalizing {}", vm.name));
        tracing::info!(vm = %vm.name, "Generalizing VM");
        cancel.step("generalize", &vm.name, api.generalize_vm(vm)).await?;
    }
    Ok(())
}

async fn export_image(api: &dyn AzureApi, vm: &AzVm, cancel: &CancelToken) -> Result<Vec<ExportResult>> {
    let image_name = format!("{}-image-{}", vm.name, Utc::now().timestamp());
    let image_id = cancel
        .step("create image", &vm.name, api.create_image(vm, &image_name))
        .await?;
    tracing::info!(vm = %vm.name, image = %image_id, "Managed image created");

    let disk_name = vm
        .disks()
        .first()
        .map(|d| d.name.clone())
        .unwrap_or_else(|| vm.name.clone());
    let mut result = ExportResult::new(ProviderType::Azure, disk_name, "image", PathBuf::new(), 0);
    result.image_name = Some(image_name);
    result.disk_type = DiskLabels::AZURE.label(0);
    Ok(vec![result])
}

async fn revoke(api: &dyn AzureApi, disk: &AzDisk) {
    match tokio::time::timeout(REVOKE_TIMEOUT, api.revoke_disk_access(&disk.id)).await {
        Ok(Ok(())) => tracing::info!(disk = %disk.name, "Disk access revoked"),
        Ok(Err(e)) => tracing::warn!(disk = %disk.name, error = %e, "Failed to revoke disk access"),
        Err(_) => tracing::warn!(disk = %disk.name, "Timed out revoking disk access"),
    }
}

/// One disk: the grant is always paired with exactly one revoke
async fn export_disk(
    api: &dyn AzureApi,
    disk: AzDisk,
    index: usize,
    total: usize,
    opts: &AzureExportOptions,
    transfer: &Transfer,
    cancel: &CancelToken,
) -> Result<ExportResult> {
    transfer
        .progress()
        .describe(&format!("Exporting disk {}/{}: {}", index + 1, total, disk.name));
    tracing::info!(disk = %disk.name, "Granting disk access");

    let sas = match cancel
        .step(
            "grant access",
            &disk.name,
            api.grant_disk_access(&disk.id, opts.access_duration),
        )
        .await
    {
        Ok(sas) => sas,
        Err(e) => {
            // A grant interrupted mid-flight may still have gone through
            if e.is_cancelled() && opts.revoke_access {
                revoke(api, &disk).await;
            }
            return Err(e);
        }
    };

    let outcome = copy_and_download(api, &disk, &sas, index, total, opts, transfer, cancel).await;

    if opts.revoke_access {
        revoke(api, &disk).await;
    }
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn copy_and_download(
    api: &dyn AzureApi,
    disk: &AzDisk,
    sas: &str,
    index: usize,
    total: usize,
    opts: &AzureExportOptions,
    transfer: &Transfer,
    cancel: &CancelToken,
) -> Result<ExportResult> {
    let mut result = ExportResult::new(ProviderType::Azure, &disk.name, "vhd", PathBuf::new(), 0);
    result.disk_type = DiskLabels::AZURE.label(index);
    result.disk_size_gb = disk.size_gb;

    if let Some(container) = opts.container_url.as_deref().filter(|_| opts.copy_to_blob) {
        let blob = blob_url(container, &format!("{}-{}.vhd", disk.name, Utc::now().timestamp()));
        tracing::info!(disk = %disk.name, blob = %strip_sas(&blob), "Copying VHD to blob storage");
        cancel
            .step("blob copy", &disk.name, api.start_blob_copy(sas, &blob))
            .await?;

        let blob_ref: &str = &blob;
        let disk_name: &str = &disk.name;
        let progress = transfer.progress();
        poll_until(
            &format!("blob copy of {}", disk.name),
            PollConfig::new(COPY_POLL_INTERVAL, COPY_TIMEOUT),
            cancel,
            move || async move {
                match api.blob_copy_status(blob_ref).await {
                    Ok(BlobCopyState::Success) => Ok(Poll::Ready(())),
                    Ok(BlobCopyState::Pending { progress: copied }) => {
                        let status = copied.unwrap_or_else(|| "pending".to_string());
                        progress.describe(&format!("Copy progress: {}", status));
                        Ok(Poll::Pending(status))
                    }
                    Ok(BlobCopyState::Failed(reason)) => {
                        Err(ExportError::lifecycle("blob copy", disk_name, reason))
                    }
                    Err(e) => Err(ExportError::lifecycle("blob copy status", disk_name, e)),
                }
            },
        )
        .await?;

        tracing::info!(disk = %disk.name, blob = %strip_sas(&blob), "VHD copied to blob storage");
        result.blob_url = Some(strip_sas(&blob).to_string());
    }

    if opts.download_local {
        let file_name = format!("{}.vhd", disk.name);
        let path = opts.output_dir.join(&file_name);
        let source = api.disk_source(&disk.id, sas);

        tracing::info!(disk = %disk.name, path = %path.display(), "Downloading VHD");
        let size = transfer
            .download(source.as_ref(), &path, &FileInfo::new(file_name, index + 1, total), cancel)
            .await?;

        result.local_path = path;
        result.size_bytes = size;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAzure;
    use std::sync::Arc;
    use tempfile::TempDir;
    use vmexport_core::{ProgressSink, ProgressUpdate, TransferOptions};

    fn options(dir: &TempDir) -> AzureExportOptions {
        AzureExportOptions {
            format: AzureFormat::Vhd,
            output_dir: dir.path().to_path_buf(),
            container_url: None,
            copy_to_blob: false,
            download_local: true,
            revoke_access: true,
            access_duration: Duration::from_secs(3600),
            deallocate: true,
            generalize: true,
            parallel_disks: 1,
            transfer: TransferOptions::default(),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_order_and_labels() {
        let dir = TempDir::new().unwrap();
        let mock = MockAzure::with_vm("web-01", &[("os", 4096), ("data-a", 2048), ("data-b", 1024)]);
        let vm = mock.vm("web-01");

        let results = export_vm(&mock, &vm, &options(&dir), &Transfer::default(), &CancelToken::new())
            .await
            .unwrap();

        let labels: Vec<_> = results.iter().map(|r| r.disk_type.as_str()).collect();
        assert_eq!(labels, vec!["OS", "Data-1", "Data-2"]);
        assert_eq!(results[0].size_bytes, 4096);
        assert_eq!(results[2].local_path, dir.path().join("data-b.vhd"));
        assert_eq!(std::fs::read(dir.path().join("os.vhd")).unwrap().len(), 4096);

        assert_eq!(
            mock.calls(),
            vec![
                "deallocate web-01",
                "generalize web-01",
                "grant os",
                "revoke os",
                "grant data-a",
                "revoke data-a",
                "grant data-b",
                "revoke data-b",
            ]
        );
    }

    #[tokio::test]
    async fn test_partial_failure_skips_disk_and_revokes() {
        let dir = TempDir::new().unwrap();
        let mock = MockAzure::with_vm("web-01", &[("os", 512), ("data-a", 512), ("data-b", 512)])
            .failing_download("data-a");
        let vm = mock.vm("web-01");

        let results = export_vm(&mock, &vm, &options(&dir), &Transfer::default(), &CancelToken::new())
            .await
            .unwrap();

        let names: Vec<_> = results.iter().map(|r| r.disk_name.as_str()).collect();
        assert_eq!(names, vec!["os", "data-b"]);
        // Labels follow attachment index, leaving a gap for the failed disk
        assert_eq!(results[1].disk_type, "Data-2");
        assert_eq!(mock.count("grant"), 3);
        assert_eq!(mock.count("revoke"), 3);
    }

    #[tokio::test]
    async fn test_all_disks_failed() {
        let dir = TempDir::new().unwrap();
        let mock = MockAzure::with_vm("web-01", &[("os", 512), ("data-a", 512)])
            .failing_grant("os")
            .failing_download("data-a");
        let vm = mock.vm("web-01");

        let err = export_vm(&mock, &vm, &options(&dir), &Transfer::default(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::AllDisksFailed { attempted: 2, .. }));
        // A failed grant has nothing to revoke
        assert_eq!(mock.count("revoke"), 1);
    }

    #[tokio::test]
    async fn test_vm_without_disks() {
        let dir = TempDir::new().unwrap();
        let mock = MockAzure::with_vm("empty", &[]);
        let vm = mock.vm("empty");

        let err = export_vm(&mock, &vm, &options(&dir), &Transfer::default(), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::NoDisks(_)));
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_mid_download_still_revokes() {
        let dir = TempDir::new().unwrap();
        let mock = MockAzure::with_vm("web-01", &[("os", 64 * 1024), ("data-a", 1024)]);
        let vm = mock.vm("web-01");

        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let sink = ProgressSink::new(
            Some(Arc::new(move |u: &ProgressUpdate| {
                if u.current >= 16 * 1024 {
                    trigger.cancel();
                }
            })),
            None,
        );
        let transfer = Transfer::new(TransferOptions::default(), sink);

        let err = export_vm(&mock, &vm, &options(&dir), &transfer, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(mock.count("grant"), 1);
        assert_eq!(mock.count("revoke"), 1);
    }

    #[tokio::test]
    async fn test_deallocate_and_generalize_can_be_skipped() {
        let dir = TempDir::new().unwrap();
        let mock = MockAzure::with_vm("web-01", &[("os", 128)]);
        let vm = mock.vm("web-01");
        let opts = AzureExportOptions {
            deallocate: false,
            generalize: false,
            ..options(&dir)
        };

        export_vm(&mock, &vm, &opts, &Transfer::default(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(mock.calls(), vec!["grant os", "revoke os"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_blob_copy_polls_until_success() {
        let dir = TempDir::new().unwrap();
        let mock = MockAzure::with_vm("web-01", &[("os", 128)]).copy_pending_polls(2);
        let vm = mock.vm("web-01");
        let opts = AzureExportOptions {
            container_url: Some("https://acct.blob.core.windows.net/vhds?sig=secret".into()),
            copy_to_blob: true,
            download_local: false,
            ..options(&dir)
        };

        let results = export_vm(&mock, &vm, &opts, &Transfer::default(), &CancelToken::new())
            .await
            .unwrap();

        let blob = results[0].blob_url.as_deref().unwrap();
        assert!(blob.starts_with("https://acct.blob.core.windows.net/vhds/os-"));
        assert!(!blob.contains("sig="));
        assert_eq!(mock.count("copy-status"), 3);
        assert_eq!(mock.count("revoke"), 1);
    }

    #[tokio::test]
    async fn test_parallel_disks_keep_order() {
        let dir = TempDir::new().unwrap();
        let mock = MockAzure::with_vm("db", &[("os", 30_000), ("d1", 100), ("d2", 20_000)]);
        let vm = mock.vm("db");
        let opts = AzureExportOptions {
            parallel_disks: 3,
            ..options(&dir)
        };

        let results = export_vm(&mock, &vm, &opts, &Transfer::default(), &CancelToken::new())
            .await
            .unwrap();
        let names: Vec<_> = results.iter().map(|r| r.disk_name.as_str()).collect();
        assert_eq!(names, vec!["os", "d1", "d2"]);
        assert_eq!(mock.count("revoke"), 3);
    }

    #[tokio::test]
    async fn test_image_format() {
        let dir = TempDir::new().unwrap();
        let mock = MockAzure::with_vm("web-01", &[("os", 128)]);
        let vm = mock.vm("web-01");
        let opts = AzureExportOptions {
            format: AzureFormat::Image,
            ..options(&dir)
        };

        let results = export_vm(&mock, &vm, &opts, &Transfer::default(), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].format, "image");
        assert!(results[0].image_name.as_deref().unwrap().starts_with("web-01-image-"));
        assert_eq!(mock.count("grant"), 0);
    }
}
