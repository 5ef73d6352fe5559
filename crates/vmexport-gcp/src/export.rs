//! GCP disk export state machine
//!
//! discover disks → per disk: create image → export image to GCS →
//! download → [delete GCS object]

use crate::api::{GceDisk, GceInstance, GcpApi};
use crate::options::{GcpExportOptions, GcpFormat};
use chrono::Utc;
use std::path::PathBuf;
use vmexport_core::transfer::FileInfo;
use vmexport_core::{
    CancelToken, DiskLabels, ExportError, ExportResult, ProviderType, Result, Transfer,
    export_disks,
};

pub async fn export_vm(
    api: &dyn GcpApi,
    instance: &GceInstance,
    opts: &GcpExportOptions,
    transfer: &Transfer,
    cancel: &CancelToken,
) -> Result<Vec<ExportResult>> {
    let disks = instance.disks();
    if disks.is_empty() {
        return Err(ExportError::NoDisks(instance.name.clone()));
    }

    tracing::info!(
        instance = %instance.name,
        format = opts.format.as_str(),
        disks = disks.len(),
        "Starting GCP export"
    );

    let total = disks.len();
    let results = export_disks(&instance.name, disks, opts.parallel_disks, |index, disk| {
        export_disk(api, disk, index, total, opts, transfer, cancel)
    })
    .await?;

    tracing::info!(instance = %instance.name, disks_exported = results.len(), "GCP export complete");
    Ok(results)
}

async fn create_image(
    api: &dyn GcpApi,
    disk: &GceDisk,
    image_name: &str,
    opts: &GcpExportOptions,
    cancel: &CancelToken,
) -> Result<()> {
    cancel
        .step("create image", &disk.name, async {
            tokio::time::timeout(opts.image_timeout, api.create_image(image_name, disk))
                .await
                .map_err(|_| {
                    ExportError::Timeout(format!(
                        "image {} not ready after {}s",
                        image_name,
                        opts.image_timeout.as_secs()
                    ))
                })?
                .map_err(ExportError::from)
        })
        .await
}

async fn export_disk(
    api: &dyn GcpApi,
    disk: GceDisk,
    index: usize,
    total: usize,
    opts: &GcpExportOptions,
    transfer: &Transfer,
    cancel: &CancelToken,
) -> Result<ExportResult> {
    transfer
        .progress()
        .describe(&format!("Exporting disk {}/{}: {}", index + 1, total, disk.name));

    let image_name = format!("{}-image-{}", disk.name, Utc::now().timestamp());
    tracing::info!(disk = %disk.name, image = %image_name, "Creating image from disk");
    create_image(api, &disk, &image_name, opts, cancel).await?;

    let mut result = ExportResult::new(
        ProviderType::Gcp,
        &disk.name,
        opts.format.as_str(),
        PathBuf::new(),
        0,
    );
    result.image_name = Some(image_name.clone());
    result.disk_type = DiskLabels::GCP.label(index);
    result.disk_size_gb = disk.size_gb;

    let Some(bucket) = opts.bucket.as_deref().filter(|_| opts.format != GcpFormat::Image) else {
        return Ok(result);
    };

    let object = opts.object_name(&image_name);
    let uri = format!("gs://{}/{}", bucket, object);
    transfer
        .progress()
        .describe(&format!("Exporting image to GCS as {}", opts.format.as_str()));
    tracing::info!(image = %image_name, destination = %uri, "Exporting image to GCS");
    cancel
        .step("image export", &disk.name, api.export_image(&image_name, &uri, opts.format))
        .await?;

    result.gcs_bucket = Some(bucket.to_string());
    result.gcs_object = Some(object.clone());
    result.gcs_uri = Some(uri);

    if !opts.download_local {
        return Ok(result);
    }

    let file_name = object.rsplit('/').next().unwrap_or(&object).to_string();
    let path = opts.output_dir.join(&file_name);
    transfer.progress().describe("Downloading from GCS");
    let source = cancel
        .step("open object", &disk.name, api.object_source(bucket, &object))
        .await?;
    let size = transfer
        .download(source.as_ref(), &path, &FileInfo::new(file_name, index + 1, total), cancel)
        .await?;
    tracing::info!(disk = %disk.name, path = %path.display(), size_bytes = size, "Disk downloaded");

    result.local_path = path;
    result.size_bytes = size;

    if opts.delete_from_gcs {
        match api.delete_object(bucket, &object).await {
            Ok(()) => tracing::info!(object = %object, "Deleted exported object from GCS"),
            Err(e) => tracing::warn!(object = %object, error = %e, "Failed to delete exported object"),
        }
    }

    Ok(result)
}
