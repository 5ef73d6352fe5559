//! EC2 instance export state machine
//!
//! create export task → poll until completed → download from S3 →
//! [delete S3 object]
//!
//! An export task images the whole instance, so the export yields a single
//! result labelled `boot`.

use crate::api::{AwsApi, Ec2Instance, ExportTarget, ExportTaskState};
use crate::options::{AwsExportOptions, TASK_POLL_INTERVAL};
use std::path::PathBuf;
use std::time::Duration;
use vmexport_core::transfer::FileInfo;
use vmexport_core::{
    CancelToken, DiskLabels, ExportError, ExportResult, Poll, PollConfig, ProviderType, Result,
    Transfer, export_disks, poll_until,
};

const CANCEL_TASK_TIMEOUT: Duration = Duration::from_secs(60);

pub async fn export_vm(
    api: &dyn AwsApi,
    instance: &Ec2Instance,
    opts: &AwsExportOptions,
    transfer: &Transfer,
    cancel: &CancelToken,
) -> Result<Vec<ExportResult>> {
    if instance.volume_ids().is_empty() {
        return Err(ExportError::NoDisks(instance.name().to_string()));
    }

    tracing::info!(
        instance = %instance.instance_id,
        name = %instance.name(),
        format = opts.format.as_str(),
        "Starting EC2 export"
    );
    let results = export_disks(
        instance.name(),
        vec![instance.instance_id.clone()],
        1,
        |_, instance_id| export_instance(api, instance_id, opts, transfer, cancel),
    )
    .await?;

    tracing::info!(instance = %instance.instance_id, "EC2 export complete");
    Ok(results)
}

async fn cancel_task(api: &dyn AwsApi, task_id: &str) {
    match tokio::time::timeout(CANCEL_TASK_TIMEOUT, api.cancel_export_task(task_id)).await {
        Ok(Ok(())) => tracing::info!(task_id = %task_id, "Export task cancelled"),
        Ok(Err(e)) => tracing::warn!(task_id = %task_id, error = %e, "Failed to cancel export task"),
        Err(_) => tracing::warn!(task_id = %task_id, "Timed out cancelling export task"),
    }
}

/// Poll the task until it reports its S3 key
async fn wait_for_task(
    api: &dyn AwsApi,
    task_id: &str,
    opts: &AwsExportOptions,
    transfer: &Transfer,
    cancel: &CancelToken,
) -> Result<String> {
    let progress = transfer.progress();
    poll_until(
        &format!("export task {}", task_id),
        PollConfig::new(TASK_POLL_INTERVAL, opts.export_timeout),
        cancel,
        move || async move {
            let task = api
                .describe_export_task(task_id)
                .await
                .map_err(|e| ExportError::lifecycle("describe export task", task_id, e))?;
            match task.state {
                ExportTaskState::Completed => task.s3_key().map(|k| Poll::Ready(k.to_string())).ok_or_else(|| {
                    ExportError::lifecycle("export task", task_id, "completed without an S3 key")
                }),
                ExportTaskState::Cancelled | ExportTaskState::Cancelling => Err(ExportError::lifecycle(
                    "export task",
                    task_id,
                    task.status_message.unwrap_or_else(|| "task was cancelled".to_string()),
                )),
                ExportTaskState::Active | ExportTaskState::Unknown => {
                    let status = task.status_message.unwrap_or_else(|| "active".to_string());
                    progress.describe(&format!("Export task: {}", status));
                    Ok(Poll::Pending(status))
                }
            }
        },
    )
    .await
}

async fn export_instance(
    api: &dyn AwsApi,
    instance_id: String,
    opts: &AwsExportOptions,
    transfer: &Transfer,
    cancel: &CancelToken,
) -> Result<ExportResult> {
    let target = ExportTarget {
        bucket: opts.bucket.clone(),
        prefix: opts.s3_prefix.clone(),
        format: opts.format,
    };
    transfer.progress().describe("Creating export task");
    let task_id = cancel
        .step("create export task", &instance_id, api.create_export_task(&instance_id, &target))
        .await?;

    let key = match wait_for_task(api, &task_id, opts, transfer, cancel).await {
        Ok(key) => key,
        Err(e) => {
            // Leave nothing running in the account once we give up on the task
            if e.is_cancelled() || matches!(e, ExportError::Timeout(_)) {
                cancel_task(api, &task_id).await;
            }
            return Err(e);
        }
    };
    tracing::info!(task_id = %task_id, key = %key, "Export task completed");

    let mut result = ExportResult::new(
        ProviderType::Aws,
        &instance_id,
        opts.format.as_str(),
        PathBuf::new(),
        0,
    );
    result.disk_type = DiskLabels::AWS.label(0);
    result.s3_url = Some(format!("s3://{}/{}", opts.bucket, key));

    if !opts.download_local {
        return Ok(result);
    }

    let file_name = format!("{}.{}", instance_id, opts.format.as_str());
    let path = opts.output_dir.join(&file_name);
    transfer.progress().describe("Downloading from S3");
    let source = cancel
        .step("presign object", &instance_id, api.object_source(&opts.bucket, &key))
        .await?;
    let size = transfer
        .download(source.as_ref(), &path, &FileInfo::new(file_name, 1, 1), cancel)
        .await?;
    tracing::info!(instance = %instance_id, path = %path.display(), size_bytes = size, "Image downloaded");

    result.local_path = path;
    result.size_bytes = size;

    if opts.delete_from_s3 {
        match api.delete_object(&opts.bucket, &key).await {
            Ok(()) => tracing::info!(key = %key, "Deleted exported object from S3"),
            Err(e) => tracing::warn!(key = %key, error = %e, "Failed to delete exported object"),
        }
    }
    Ok(result)
}
