//! Compute Engine and Cloud Storage operations used by the exporter

use crate::error::Result;
use crate::options::GcpFormat;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use vmexport_core::ByteSource;

#[async_trait]
pub trait GcpApi: Send + Sync {
    /// Cheap read-only call proving the credentials work
    async fn validate(&self) -> Result<()>;

    async fn list_instances(&self) -> Result<Vec<GceInstance>>;

    async fn get_instance(&self, name: &str) -> Result<GceInstance>;

    /// Blocks until the image is READY
    async fn create_image(&self, image_name: &str, disk: &GceDisk) -> Result<()>;

    /// `gcloud compute images export` into `destination_uri` (a `gs://` URI)
    async fn export_image(
        &self,
        image_name: &str,
        destination_uri: &str,
        format: GcpFormat,
    ) -> Result<()>;

    /// Byte source reading a GCS object
    async fn object_source(&self, bucket: &str, object: &str) -> Result<Box<dyn ByteSource>>;

    async fn delete_object(&self, bucket: &str, object: &str) -> Result<()>;
}

/// Last path segment of a Compute Engine resource URL
pub(crate) fn short_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// `gcloud compute instances describe --format=json`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceInstance {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub zone: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub machine_type: String,
    #[serde(default)]
    pub disks: Vec<AttachedDisk>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub creation_timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDisk {
    #[serde(default)]
    pub boot: bool,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub device_name: String,
    /// Disk resource URL
    #[serde(default)]
    pub source: String,
    /// int64 fields arrive as strings
    #[serde(default)]
    pub disk_size_gb: Option<String>,
    #[serde(default)]
    pub licenses: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default, rename = "networkIP")]
    pub network_ip: Option<String>,
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(default, rename = "natIP")]
    pub nat_ip: Option<String>,
}

/// One persistent disk to export
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GceDisk {
    pub name: String,
    pub zone: String,
    pub size_gb: Option<u64>,
}

impl AsRef<str> for GceDisk {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

impl GceInstance {
    pub fn zone_name(&self) -> &str {
        short_name(&self.zone)
    }

    pub fn machine_type_name(&self) -> &str {
        short_name(&self.machine_type)
    }

    /// Attached disks, boot disk first, then by attachment index
    pub fn disks(&self) -> Vec<GceDisk> {
        let mut attached: Vec<&AttachedDisk> =
            self.disks.iter().filter(|d| !d.source.is_empty()).collect();
        attached.sort_by_key(|d| (!d.boot, d.index));
        attached
            .into_iter()
            .map(|d| GceDisk {
                name: short_name(&d.source).to_string(),
                zone: disk_zone(&d.source).unwrap_or(self.zone_name()).to_string(),
                size_gb: d.disk_size_gb.as_deref().and_then(|s| s.parse().ok()),
            })
            .collect()
    }

    pub fn disk_names(&self) -> Vec<String> {
        self.disks().into_iter().map(|d| d.name).collect()
    }

    pub fn internal_ip(&self) -> Option<&str> {
        self.network_interfaces
            .iter()
            .find_map(|n| n.network_ip.as_deref())
    }

    pub fn external_ip(&self) -> Option<&str> {
        self.network_interfaces
            .iter()
            .flat_map(|n| n.access_configs.iter())
            .find_map(|a| a.nat_ip.as_deref())
    }

    pub fn ip_addresses(&self) -> Vec<String> {
        [self.internal_ip(), self.external_ip()]
            .into_iter()
            .flatten()
            .map(str::to_string)
            .collect()
    }

    pub fn storage_gb(&self) -> u64 {
        self.disks().iter().filter_map(|d| d.size_gb).sum()
    }

    /// Boot disk license, e.g. `debian-12-bookworm`
    pub fn guest_os(&self) -> Option<&str> {
        self.disks
            .iter()
            .find(|d| d.boot)
            .and_then(|d| d.licenses.first())
            .map(|l| short_name(l))
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.creation_timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }
}

/// Zone embedded in a disk URL (`.../zones/<zone>/disks/<name>`)
fn disk_zone(source: &str) -> Option<&str> {
    let mut parts = source.split('/');
    while let Some(part) = parts.next() {
        if part == "zones" {
            return parts.next();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSTANCE: &str = r#"{
        "id": "4567",
        "name": "web-01",
        "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a",
        "status": "RUNNING",
        "machineType": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/machineTypes/e2-medium",
        "creationTimestamp": "2024-03-01T10:00:00.000-08:00",
        "disks": [
            {"boot": false, "index": 2, "source": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-b/disks/logs", "diskSizeGb": "50"},
            {"boot": true, "index": 0, "source": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/disks/web-01", "diskSizeGb": "10",
             "licenses": ["https://www.googleapis.com/compute/v1/projects/debian-cloud/global/licenses/debian-12-bookworm"]},
            {"boot": false, "index": 1, "source": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/disks/data", "diskSizeGb": "100"}
        ],
        "networkInterfaces": [{"networkIP": "10.0.0.2", "accessConfigs": [{"natIP": "34.1.2.3"}]}],
        "labels": {"env": "prod"}
    }"#;

    #[test]
    fn test_instance_parsing() {
        let vm: GceInstance = serde_json::from_str(INSTANCE).unwrap();
        assert_eq!(vm.zone_name(), "us-central1-a");
        assert_eq!(vm.machine_type_name(), "e2-medium");
        assert_eq!(vm.disk_names(), vec!["web-01", "data", "logs"]);
        assert_eq!(vm.disks()[2].zone, "us-central1-b");
        assert_eq!(vm.storage_gb(), 160);
        assert_eq!(vm.ip_addresses(), vec!["10.0.0.2", "34.1.2.3"]);
        assert_eq!(vm.guest_os(), Some("debian-12-bookworm"));
        assert_eq!(
            vm.created_at().unwrap().to_rfc3339(),
            "2024-03-01T18:00:00+00:00"
        );
    }
}
