//! In-memory [`AzureApi`] for tests

use crate::api::{AccountInfo, AzVm, AzureApi, BlobCopyState};
use crate::error::{AzureError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use vmexport_core::ByteSource;
use vmexport_core::cli::CliError;
use vmexport_core::transfer::MemorySource;

#[derive(Default)]
pub struct MockAzure {
    vms: Vec<AzVm>,
    disk_sizes: HashMap<String, usize>,
    failing_grants: HashSet<String>,
    failing_downloads: HashSet<String>,
    pending_polls: AtomicU32,
    calls: Mutex<Vec<String>>,
}

fn disk_id(name: &str) -> String {
    format!("/subscriptions/0000/resourceGroups/rg/providers/Microsoft.Compute/disks/{}", name)
}

fn disk_name(id: &str) -> &str {
    id.rsplit('/').next().unwrap_or(id)
}

fn failed(command: &str) -> AzureError {
    AzureError::Cli(CliError::Failed {
        program: "az".into(),
        command: command.into(),
        stderr: "simulated failure".into(),
    })
}

impl MockAzure {
    /// A VM whose first disk is the OS disk; sizes are in bytes
    pub fn with_vm(name: &str, disks: &[(&str, usize)]) -> Self {
        let mut storage = serde_json::json!({ "dataDisks": [] });
        for (lun, (disk, _)) in disks.iter().enumerate() {
            let entry = serde_json::json!({
                "name": disk,
                "diskSizeGb": 1,
                "managedDisk": { "id": disk_id(disk) },
            });
            if lun == 0 {
                storage["osDisk"] = entry;
            } else {
                let mut entry = entry;
                entry["lun"] = serde_json::json!(lun - 1);
                storage["dataDisks"]
                    .as_array_mut()
                    .expect("dataDisks is an array")
                    .push(entry);
            }
        }
        let vm: AzVm = serde_json::from_value(serde_json::json!({
            "id": format!("/subscriptions/0000/resourceGroups/rg/providers/Microsoft.Compute/virtualMachines/{}", name),
            "name": name,
            "location": "eastus",
            "powerState": "VM running",
            "hardwareProfile": { "vmSize": "Standard_B2s" },
            "storageProfile": storage,
            "tags": { "env": "test" },
        }))
        .expect("valid VM JSON");

        Self {
            vms: vec![vm],
            disk_sizes: disks.iter().map(|(d, size)| (d.to_string(), *size)).collect(),
            ..Default::default()
        }
    }

    pub fn failing_grant(mut self, disk: &str) -> Self {
        self.failing_grants.insert(disk.to_string());
        self
    }

    pub fn failing_download(mut self, disk: &str) -> Self {
        self.failing_downloads.insert(disk.to_string());
        self
    }

    /// Report the blob copy as pending this many times before success
    pub fn copy_pending_polls(self, polls: u32) -> Self {
        self.pending_polls.store(polls, Ordering::SeqCst);
        self
    }

    pub fn vm(&self, name: &str) -> AzVm {
        self.vms
            .iter()
            .find(|vm| vm.name == name)
            .cloned()
            .expect("VM registered in mock")
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.split(' ').next() == Some(verb))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl AzureApi for MockAzure {
    async fn login(&self) -> Result<()> {
        Ok(())
    }

    async fn account(&self) -> Result<AccountInfo> {
        Ok(AccountInfo {
            id: "0000".into(),
            name: "test".into(),
            tenant_id: "tenant".into(),
        })
    }

    async fn list_vms(&self) -> Result<Vec<AzVm>> {
        Ok(self.vms.clone())
    }

    async fn get_vm(&self, identifier: &str) -> Result<AzVm> {
        self.vms
            .iter()
            .find(|vm| vm.name == identifier || vm.id == identifier)
            .cloned()
            .ok_or_else(|| AzureError::VmNotFound(identifier.to_string()))
    }

    async fn deallocate_vm(&self, vm: &AzVm) -> Result<()> {
        self.record(format!("deallocate {}", vm.name));
        Ok(())
    }

    async fn generalize_vm(&self, vm: &AzVm) -> Result<()> {
        self.record(format!("generalize {}", vm.name));
        Ok(())
    }

    async fn create_image(&self, vm: &AzVm, image_name: &str) -> Result<String> {
        self.record(format!("image {}", vm.name));
        Ok(format!("/subscriptions/0000/images/{}", image_name))
    }

    async fn grant_disk_access(&self, disk_id: &str, _duration: Duration) -> Result<String> {
        let name = disk_name(disk_id);
        self.record(format!("grant {}", name));
        if self.failing_grants.contains(name) {
            return Err(failed("disk grant-access"));
        }
        Ok(format!("https://md-{}.blob.core.windows.net/abcd?sv=2021&sig=sas", name))
    }

    async fn revoke_disk_access(&self, disk_id: &str) -> Result<()> {
        self.record(format!("revoke {}", disk_name(disk_id)));
        Ok(())
    }

    async fn start_blob_copy(&self, _source_url: &str, _blob_url: &str) -> Result<()> {
        self.record("copy-start".into());
        Ok(())
    }

    async fn blob_copy_status(&self, _blob_url: &str) -> Result<BlobCopyState> {
        self.record("copy-status".into());
        let remaining = self.pending_polls.load(Ordering::SeqCst);
        if remaining > 0 {
            self.pending_polls.store(remaining - 1, Ordering::SeqCst);
            return Ok(BlobCopyState::Pending {
                progress: Some(format!("{} polls left", remaining)),
            });
        }
        Ok(BlobCopyState::Success)
    }

    fn disk_source(&self, disk_id: &str, _sas_url: &str) -> Box<dyn ByteSource> {
        let name = disk_name(disk_id);
        let size = self.disk_sizes.get(name).copied().unwrap_or(0);
        let data: Vec<u8> = (0..size).map(|i| (i % 251) as u8).collect();
        let source = MemorySource::new(format!("azure-disk:{}", disk_id), data);
        if self.failing_downloads.contains(name) {
            Box::new(source.fail_after(0))
        } else {
            Box::new(source)
        }
    }
}
