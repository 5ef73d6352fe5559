//! In-memory [`GcpApi`] for tests

use crate::api::{GceDisk, GceInstance, GcpApi};
use crate::error::{GcpError, Result};
use crate::options::GcpFormat;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use vmexport_core::ByteSource;
use vmexport_core::cli::CliError;
use vmexport_core::transfer::MemorySource;

#[derive(Default)]
pub struct MockGcp {
    instances: Vec<GceInstance>,
    disk_sizes: HashMap<String, usize>,
    failing_images: HashSet<String>,
    stuck_images: HashSet<String>,
    failing_downloads: HashSet<String>,
    /// object name → source disk
    objects: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<String>>,
}

fn disk_url(name: &str) -> String {
    format!(
        "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/disks/{}",
        name
    )
}

impl MockGcp {
    /// An instance whose first disk is the boot disk; sizes are in bytes
    pub fn with_instance(name: &str, disks: &[(&str, usize)]) -> Self {
        let attached: Vec<_> = disks
            .iter()
            .enumerate()
            .map(|(index, (disk, _))| {
                serde_json::json!({
                    "boot": index == 0,
                    "index": index,
                    "source": disk_url(disk),
                    "diskSizeGb": "10",
                })
            })
            .collect();
        let instance: GceInstance = serde_json::from_value(serde_json::json!({
            "id": "1234567890",
            "name": name,
            "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a",
            "status": "RUNNING",
            "machineType": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/machineTypes/e2-medium",
            "disks": attached,
            "networkInterfaces": [{"networkIP": "10.128.0.2"}],
            "labels": {"team": "platform"},
        }))
        .expect("valid instance JSON");

        Self {
            instances: vec![instance],
            disk_sizes: disks.iter().map(|(d, size)| (d.to_string(), *size)).collect(),
            ..Default::default()
        }
    }

    pub fn failing_image(mut self, disk: &str) -> Self {
        self.failing_images.insert(disk.to_string());
        self
    }

    /// Image creation for `disk` never completes
    pub fn stuck_image(mut self, disk: &str) -> Self {
        self.stuck_images.insert(disk.to_string());
        self
    }

    pub fn failing_download(mut self, disk: &str) -> Self {
        self.failing_downloads.insert(disk.to_string());
        self
    }

    pub fn instance(&self, name: &str) -> GceInstance {
        self.instances
            .iter()
            .find(|i| i.name == name)
            .cloned()
            .expect("instance registered in mock")
    }

    pub fn count(&self, verb: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.split(' ').next() == Some(verb))
            .count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl GcpApi for MockGcp {
    async fn validate(&self) -> Result<()> {
        Ok(())
    }

    async fn list_instances(&self) -> Result<Vec<GceInstance>> {
        Ok(self.instances.clone())
    }

    async fn get_instance(&self, name: &str) -> Result<GceInstance> {
        self.instances
            .iter()
            .find(|i| i.name == name)
            .cloned()
            .ok_or_else(|| GcpError::InstanceNotFound(name.to_string()))
    }

    async fn create_image(&self, image_name: &str, disk: &GceDisk) -> Result<()> {
        self.record(format!("create-image {}", disk.name));
        if self.stuck_images.contains(&disk.name) {
            std::future::pending::<()>().await;
        }
        if self.failing_images.contains(&disk.name) {
            return Err(GcpError::Cli(CliError::Failed {
                program: "gcloud".into(),
                command: "compute images create".into(),
                stderr: format!("quota exceeded creating {}", image_name),
            }));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(image_name.to_string(), disk.name.clone());
        Ok(())
    }

    async fn export_image(
        &self,
        image_name: &str,
        destination_uri: &str,
        _format: GcpFormat,
    ) -> Result<()> {
        self.record(format!("export-image {}", destination_uri));
        let mut objects = self.objects.lock().unwrap();
        let disk = objects
            .get(image_name)
            .cloned()
            .ok_or_else(|| GcpError::InvalidConfig(format!("no image {}", image_name)))?;
        let object = destination_uri.splitn(4, '/').nth(3).unwrap_or_default();
        objects.insert(object.to_string(), disk);
        Ok(())
    }

    async fn object_source(&self, bucket: &str, object: &str) -> Result<Box<dyn ByteSource>> {
        self.record(format!("open gs://{}/{}", bucket, object));
        let disk = self
            .objects
            .lock()
            .unwrap()
            .get(object)
            .cloned()
            .unwrap_or_default();
        let size = self.disk_sizes.get(&disk).copied().unwrap_or(0);
        let data: Vec<u8> = (0..size).map(|i| (i % 253) as u8).collect();
        let source = MemorySource::new(format!("gs://{}/{}", bucket, object), data);
        if self.failing_downloads.contains(&disk) {
            Ok(Box::new(source.fail_after(0)))
        } else {
            Ok(Box::new(source))
        }
    }

    async fn delete_object(&self, bucket: &str, object: &str) -> Result<()> {
        self.record(format!("delete gs://{}/{}", bucket, object));
        Ok(())
    }
}
