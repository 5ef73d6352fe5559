//! Export manifest and per-VM metadata files

use crate::error::Result;
use crate::provider::{ExportResult, ProviderType, VmInfo};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// `{vm_name}-manifest.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub vm_name: String,
    pub export_time: DateTime<Utc>,
    pub disk_count: usize,
    pub disks: Vec<ExportResult>,
}

impl ExportManifest {
    pub fn new(vm_name: impl Into<String>, disks: Vec<ExportResult>) -> Self {
        Self {
            vm_name: vm_name.into(),
            export_time: Utc::now(),
            disk_count: disks.len(),
            disks,
        }
    }

    pub fn file_name(vm_name: &str) -> String {
        format!("{}-manifest.json", file_stem(vm_name))
    }

    pub fn total_bytes(&self) -> u64 {
        self.disks.iter().map(|d| d.size_bytes).sum()
    }
}

/// VM names (AWS `Name` tags in particular) may contain path separators;
/// artifact files always land directly in the output directory
fn file_stem(vm_name: &str) -> String {
    vm_name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

/// Write the manifest for `results` into `output_dir`
pub async fn create_export_manifest(
    vm_name: &str,
    results: &[ExportResult],
    output_dir: &Path,
) -> Result<PathBuf> {
    let manifest = ExportManifest::new(vm_name, results.to_vec());
    let path = output_dir.join(ExportManifest::file_name(vm_name));
    write_json(&path, &manifest).await?;
    tracing::info!(vm = %vm_name, path = %path.display(), disks = manifest.disk_count, "Wrote export manifest");
    Ok(path)
}

pub async fn load_export_manifest(path: &Path) -> Result<ExportManifest> {
    let content = fs::read_to_string(path).await?;
    Ok(serde_json::from_str(&content)?)
}

/// Informational snapshot of the exported VM, `{vm_name}-metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmMetadataRecord {
    pub provider: ProviderType,
    pub vm_name: String,
    pub vm_id: String,
    pub location: String,
    /// VM size, machine type or instance type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    pub power_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    pub export_time: DateTime<Utc>,
}

impl VmMetadataRecord {
    pub fn from_vm(vm: &VmInfo) -> Self {
        let meta_str = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| vm.metadata.get(*k).and_then(|v| v.as_str()))
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Self {
            provider: vm.provider,
            vm_name: vm.name.clone(),
            vm_id: vm.id.clone(),
            location: vm.location.clone(),
            vm_size: meta_str(&["vm_size", "machine_type", "instance_type"]),
            os_type: meta_str(&["os_type"]).or_else(|| {
                Some(vm.guest_os.clone()).filter(|s| !s.is_empty())
            }),
            power_state: vm.state.clone(),
            provisioning_state: meta_str(&["provisioning_state"]),
            resource_group: meta_str(&["resource_group"]),
            image_id: meta_str(&["image_id"]),
            export_time: Utc::now(),
        }
    }

    pub fn file_name(vm_name: &str) -> String {
        format!("{}-metadata.json", file_stem(vm_name))
    }
}

pub async fn write_vm_metadata(record: &VmMetadataRecord, output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join(VmMetadataRecord::file_name(&record.vm_name));
    write_json(&path, record).await?;
    tracing::debug!(vm = %record.vm_name, path = %path.display(), "Wrote VM metadata");
    Ok(path)
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }
    let content = serde_json::to_string_pretty(value)?;
    fs::write(path, content).await?;
    Ok(())
}

/// Write manifest and metadata after a successful export
///
/// Failures are logged and swallowed; the downloaded disks are already final.
pub async fn write_export_artifacts(vm: &VmInfo, results: &[ExportResult], output_dir: &Path) {
    if let Err(e) = create_export_manifest(&vm.name, results, output_dir).await {
        tracing::warn!(vm = %vm.name, error = %e, "Failed to write export manifest");
    }
    if let Err(e) = write_vm_metadata(&VmMetadataRecord::from_vm(vm), output_dir).await {
        tracing::warn!(vm = %vm.name, error = %e, "Failed to write VM metadata");
    }
}
