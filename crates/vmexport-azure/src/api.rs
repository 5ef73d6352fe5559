//! Azure management operations used by the exporter, and the shapes the
//! Azure CLI returns for them

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use vmexport_core::ByteSource;

/// Operations the Azure exporter needs from the management and blob planes
#[async_trait]
pub trait AzureApi: Send + Sync {
    /// Establish credentials (service principal login when configured)
    async fn login(&self) -> Result<()>;

    async fn account(&self) -> Result<AccountInfo>;

    async fn list_vms(&self) -> Result<Vec<AzVm>>;

    /// Look up a VM by name (in the configured resource group) or resource ID
    async fn get_vm(&self, identifier: &str) -> Result<AzVm>;

    /// Blocks until the VM is deallocated
    async fn deallocate_vm(&self, vm: &AzVm) -> Result<()>;

    async fn generalize_vm(&self, vm: &AzVm) -> Result<()>;

    /// Create a managed image from the VM, returning the image resource ID
    async fn create_image(&self, vm: &AzVm, image_name: &str) -> Result<String>;

    /// Grant time-bounded read access, returning the SAS URL
    async fn grant_disk_access(&self, disk_id: &str, duration: Duration) -> Result<String>;

    async fn revoke_disk_access(&self, disk_id: &str) -> Result<()>;

    /// Start a server-side copy of `source_url` into `blob_url`
    async fn start_blob_copy(&self, source_url: &str, blob_url: &str) -> Result<()>;

    async fn blob_copy_status(&self, blob_url: &str) -> Result<BlobCopyState>;

    /// Byte source reading a disk through its SAS URL
    fn disk_source(&self, disk_id: &str, sas_url: &str) -> Box<dyn ByteSource>;
}

/// `az account show`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
}

/// State of a server-side blob copy (`x-ms-copy-status`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobCopyState {
    Pending { progress: Option<String> },
    Success,
    Failed(String),
}

/// `az vm show -d` / `az vm list -d`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzVm {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub resource_group: String,
    #[serde(default)]
    pub vm_id: Option<String>,
    #[serde(default)]
    pub power_state: Option<String>,
    #[serde(default)]
    pub provisioning_state: Option<String>,
    #[serde(default)]
    pub hardware_profile: Option<HardwareProfile>,
    #[serde(default)]
    pub storage_profile: StorageProfile,
    #[serde(default)]
    pub tags: Option<HashMap<String, String>>,
    #[serde(default)]
    pub public_ips: Option<String>,
    #[serde(default)]
    pub private_ips: Option<String>,
    #[serde(default)]
    pub time_created: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareProfile {
    pub vm_size: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageProfile {
    #[serde(default)]
    pub os_disk: Option<OsDisk>,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
    #[serde(default)]
    pub image_reference: Option<ImageReference>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OsDisk {
    pub name: String,
    #[serde(default)]
    pub os_type: Option<String>,
    #[serde(default, alias = "diskSizeGB")]
    pub disk_size_gb: Option<u64>,
    #[serde(default)]
    pub managed_disk: Option<ManagedDisk>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataDisk {
    pub name: String,
    #[serde(default)]
    pub lun: u32,
    #[serde(default, alias = "diskSizeGB")]
    pub disk_size_gb: Option<u64>,
    #[serde(default)]
    pub managed_disk: Option<ManagedDisk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManagedDisk {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageReference {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub publisher: Option<String>,
    #[serde(default)]
    pub offer: Option<String>,
    #[serde(default)]
    pub sku: Option<String>,
}

/// One managed disk to export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzDisk {
    pub name: String,
    pub id: String,
    pub size_gb: Option<u64>,
}

impl AsRef<str> for AzDisk {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl AzVm {
    pub fn vm_size(&self) -> Option<&str> {
        self.hardware_profile.as_ref().map(|h| h.vm_size.as_str())
    }

    pub fn os_type(&self) -> Option<&str> {
        self.storage_profile
            .os_disk
            .as_ref()
            .and_then(|d| d.os_type.as_deref())
    }

    /// Resource group, falling back to the one embedded in the resource ID
    pub fn resource_group(&self) -> &str {
        if !self.resource_group.is_empty() {
            return &self.resource_group;
        }
        let mut parts = self.id.split('/');
        while let Some(part) = parts.next() {
            if part.eq_ignore_ascii_case("resourceGroups") {
                return parts.next().unwrap_or_default();
            }
        }
        ""
    }

    /// Managed disks in attachment order: OS disk first, then data disks by LUN
    ///
    /// Unmanaged (blob-backed) disks have no grant-access API and are skipped.
    pub fn disks(&self) -> Vec<AzDisk> {
        let mut disks = Vec::new();
        if let Some(os) = &self.storage_profile.os_disk {
            match os.managed_disk.as_ref().and_then(|m| m.id.clone()) {
                Some(id) => disks.push(AzDisk {
                    name: os.name.clone(),
                    id,
                    size_gb: os.disk_size_gb,
                }),
                None => tracing::warn!(vm = %self.name, disk = %os.name, "Skipping unmanaged OS disk"),
            }
        }

        let mut data: Vec<&DataDisk> = self.storage_profile.data_disks.iter().collect();
        data.sort_by_key(|d| d.lun);
        for disk in data {
            match disk.managed_disk.as_ref().and_then(|m| m.id.clone()) {
                Some(id) => disks.push(AzDisk {
                    name: disk.name.clone(),
                    id,
                    size_gb: disk.disk_size_gb,
                }),
                None => tracing::warn!(vm = %self.name, disk = %disk.name, "Skipping unmanaged data disk"),
            }
        }
        disks
    }

    pub fn disk_names(&self) -> Vec<String> {
        self.disks().into_iter().map(|d| d.name).collect()
    }

    pub fn ip_addresses(&self) -> Vec<String> {
        [self.public_ips.as_deref(), self.private_ips.as_deref()]
            .into_iter()
            .flatten()
            .flat_map(|ips| ips.split(','))
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn storage_gb(&self) -> u64 {
        let os = self
            .storage_profile
            .os_disk
            .as_ref()
            .and_then(|d| d.disk_size_gb)
            .unwrap_or(0);
        let data: u64 = self
            .storage_profile
            .data_disks
            .iter()
            .filter_map(|d| d.disk_size_gb)
            .sum();
        os + data
    }
}
