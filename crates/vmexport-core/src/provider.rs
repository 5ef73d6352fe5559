//! Provider trait definition and the provider-agnostic data model

use crate::cancel::CancelToken;
use crate::error::{ExportError, Result};
use crate::metadata::Metadata;
use crate::options::ExportOptions;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Provider abstraction trait
///
/// Every backend (Azure, GCP, AWS, ...) implements this trait so that callers
/// never need to know which cloud they are talking to. All methods except
/// [`Provider::connect`], [`Provider::export_capabilities`] and the identity
/// accessors fail with [`ExportError::NotConnected`] until `connect` succeeds.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human readable provider name (e.g. "Microsoft Azure")
    fn name(&self) -> &str;

    fn provider_type(&self) -> ProviderType;

    /// Establish a session. Calling it again replaces the current session.
    async fn connect(&mut self, config: &ProviderConfig) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;

    /// Lightweight read-only call confirming the credentials are authorized
    async fn validate_credentials(&self) -> Result<()>;

    async fn list_vms(&self, filter: &VmFilter) -> Result<Vec<VmInfo>>;

    async fn get_vm(&self, identifier: &str) -> Result<VmInfo>;

    /// Case-insensitive substring search over the unfiltered VM list
    async fn search_vms(&self, query: &str) -> Result<Vec<VmInfo>> {
        let vms = self.list_vms(&VmFilter::default()).await?;
        Ok(vms
            .into_iter()
            .filter(|vm| vm.matches_query(query))
            .collect())
    }

    /// Export every disk of a VM. The first result is the boot/OS disk.
    async fn export_vm(
        &self,
        identifier: &str,
        opts: &ExportOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<ExportResult>>;

    /// Static capability description; must not perform I/O
    fn export_capabilities(&self) -> ExportCapabilities;
}

/// Type of virtualization/cloud backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    VSphere,
    Aws,
    Azure,
    Gcp,
    HyperV,
    Proxmox,
}

impl ProviderType {
    pub const ALL: [ProviderType; 6] = [
        ProviderType::VSphere,
        ProviderType::Aws,
        ProviderType::Azure,
        ProviderType::Gcp,
        ProviderType::HyperV,
        ProviderType::Proxmox,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::VSphere => "vsphere",
            ProviderType::Aws => "aws",
            ProviderType::Azure => "azure",
            ProviderType::Gcp => "gcp",
            ProviderType::HyperV => "hyperv",
            ProviderType::Proxmox => "proxmox",
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderType {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        ProviderType::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| ExportError::UnknownProvider(s.to_string()))
    }
}

/// Connection parameters handed to [`Provider::connect`]
#[derive(Clone, Default)]
pub struct ProviderConfig {
    /// Injected by the registry before the factory runs
    pub provider_type: Option<ProviderType>,

    pub endpoint: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,

    /// AWS region, Azure location, GCP zone, ...
    pub region: Option<String>,
    pub insecure: bool,
    pub timeout: Option<Duration>,

    /// Provider-specific fields (subscription, resource group, bucket, ...)
    pub metadata: Metadata,
}

impl ProviderConfig {
    pub fn new(provider_type: ProviderType) -> Self {
        Self {
            provider_type: Some(provider_type),
            ..Default::default()
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_type", &self.provider_type)
            .field("endpoint", &self.endpoint)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("region", &self.region)
            .field("insecure", &self.insecure)
            .field("timeout", &self.timeout)
            .field("metadata_keys", &self.metadata.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Filtering criteria for [`Provider::list_vms`]. Criteria are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct VmFilter {
    /// Glob pattern on the VM name
    pub name_pattern: Option<String>,
    pub state: Option<String>,
    pub tags: HashMap<String, String>,
    pub location: Option<String>,
    pub min_memory_mb: Option<u64>,
    pub min_cpus: Option<u32>,
}

impl VmFilter {
    pub fn matches(&self, vm: &VmInfo) -> bool {
        if let Some(pattern) = &self.name_pattern {
            let matched = match glob::Pattern::new(pattern) {
                Ok(p) => p.matches(&vm.name),
                Err(_) => vm.name.eq_ignore_ascii_case(pattern),
            };
            if !matched {
                return false;
            }
        }
        if let Some(state) = &self.state {
            if !vm.state.eq_ignore_ascii_case(state) {
                return false;
            }
        }
        if let Some(location) = &self.location {
            if !vm.location.eq_ignore_ascii_case(location) {
                return false;
            }
        }
        if self
            .tags
            .iter()
            .any(|(k, v)| vm.tags.get(k).map(|actual| actual != v).unwrap_or(true))
        {
            return false;
        }
        if self.min_memory_mb.is_some_and(|min| vm.memory_mb < min) {
            return false;
        }
        if self.min_cpus.is_some_and(|min| vm.num_cpus < min) {
            return false;
        }
        true
    }
}

/// Metadata keys that hold size/type information searched by `search_vms`
const SEARCHABLE_METADATA: [&str; 4] = ["vm_size", "machine_type", "instance_type", "os_type"];

/// Provider-agnostic VM snapshot, rebuilt on every discovery call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmInfo {
    pub provider: ProviderType,

    /// Stable, provider-unique identifier
    pub id: String,

    /// Display name; not guaranteed unique
    pub name: String,
    pub state: String,
    pub location: String,
    pub guest_os: String,
    pub memory_mb: u64,
    pub num_cpus: u32,
    pub storage_gb: u64,
    pub ip_addresses: Vec<String>,
    pub tags: HashMap<String, String>,
    pub metadata: Metadata,
    pub created_at: Option<DateTime<Utc>>,
}

impl VmInfo {
    pub fn new(provider: ProviderType, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            provider,
            id: id.into(),
            name: name.into(),
            state: String::new(),
            location: String::new(),
            guest_os: String::new(),
            memory_mb: 0,
            num_cpus: 0,
            storage_gb: 0,
            ip_addresses: Vec::new(),
            tags: HashMap::new(),
            metadata: Metadata::new(),
            created_at: None,
        }
    }

    /// Attached disk names in attachment order, boot disk first
    pub fn disk_names(&self) -> Vec<String> {
        self.metadata
            .get("disk_names")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default()
    }

    /// Case-insensitive substring match used by [`Provider::search_vms`]
    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        let hit = |s: &str| s.to_lowercase().contains(&query);

        if hit(&self.name) || hit(&self.state) || hit(&self.location) {
            return true;
        }
        if SEARCHABLE_METADATA
            .iter()
            .filter_map(|key| self.metadata.get(*key).and_then(|v| v.as_str()))
            .any(hit)
        {
            return true;
        }
        self.tags.iter().any(|(k, v)| hit(k) || hit(v))
    }
}

/// What export formats and features a provider supports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportCapabilities {
    pub supported_formats: Vec<String>,
    pub supports_compression: bool,

    /// Can stream directly to cloud storage
    pub supports_streaming: bool,
    pub supports_snapshots: bool,

    /// 0 = unlimited
    pub max_vm_size_gb: u64,

    /// Cloud storage targets: blob, gcs, s3, local
    pub supported_targets: Vec<String>,
}

impl ExportCapabilities {
    pub fn supports_format(&self, format: &str) -> bool {
        self.supported_formats
            .iter()
            .any(|f| f.eq_ignore_ascii_case(format))
    }
}

/// Result of exporting a single disk
///
/// Field names double as the manifest's `disks[]` entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    pub provider: ProviderType,
    pub disk_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_name: Option<String>,

    /// "OS"/"boot" for the first disk, "Data-N"/"data-N" for the rest
    pub disk_type: String,
    pub format: String,
    pub local_path: PathBuf,
    pub size_bytes: u64,

    /// Declared disk size in GB as reported by the provider
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_size_gb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs_bucket: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs_object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_url: Option<String>,
}

impl ExportResult {
    pub fn new(
        provider: ProviderType,
        disk_name: impl Into<String>,
        format: impl Into<String>,
        local_path: impl Into<PathBuf>,
        size_bytes: u64,
    ) -> Self {
        Self {
            provider,
            disk_name: disk_name.into(),
            image_name: None,
            disk_type: String::new(),
            format: format.into(),
            local_path: local_path.into(),
            size_bytes,
            disk_size_gb: None,
            blob_url: None,
            gcs_bucket: None,
            gcs_object: None,
            gcs_uri: None,
            s3_url: None,
        }
    }

    /// Remote copy of the exported disk, whichever store it landed in
    pub fn remote_url(&self) -> Option<&str> {
        self.blob_url
            .as_deref()
            .or(self.gcs_uri.as_deref())
            .or(self.s3_url.as_deref())
    }
}
