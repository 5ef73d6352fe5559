//! Typed Azure connection settings and export options

use std::path::PathBuf;
use std::time::Duration;
use vmexport_core::{
    ExportError, ExportOptions, MetadataExt, ProviderConfig, Result, TransferOptions,
};

pub const DEFAULT_LOCATION: &str = "eastus";
pub const DEFAULT_ACCESS_DURATION: Duration = Duration::from_secs(3600);
pub const COPY_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const COPY_TIMEOUT: Duration = Duration::from_secs(24 * 3600);

/// Connection settings projected from [`ProviderConfig`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AzureConfig {
    pub subscription_id: Option<String>,
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub resource_group: Option<String>,
    pub location: String,
    pub storage_account: Option<String>,
    pub container: Option<String>,
    pub container_url: Option<String>,
    pub export_format: AzureFormat,
    pub timeout: Option<Duration>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}

impl AzureConfig {
    pub fn from_provider_config(config: &ProviderConfig) -> Result<Self> {
        let meta = &config.metadata;
        let export_format = match meta.get_str("export_format") {
            Some(f) if !f.is_empty() => f.parse()?,
            _ => AzureFormat::Vhd,
        };

        let cfg = Self {
            subscription_id: non_empty(meta.get_str("subscription_id")),
            tenant_id: non_empty(meta.get_str("tenant_id")),
            client_id: non_empty(meta.get_str("client_id"))
                .or_else(|| non_empty(config.username.as_deref())),
            client_secret: non_empty(meta.get_str("client_secret"))
                .or_else(|| non_empty(config.password.as_deref())),
            resource_group: non_empty(meta.get_str("resource_group")),
            location: non_empty(meta.get_str("location"))
                .or_else(|| non_empty(config.region.as_deref()))
                .unwrap_or_else(|| DEFAULT_LOCATION.to_string()),
            storage_account: non_empty(meta.get_str("storage_account")),
            container: non_empty(meta.get_str("container")),
            container_url: non_empty(meta.get_str("container_url")),
            export_format,
            timeout: config.timeout,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.client_secret.is_some() && (self.client_id.is_none() || self.tenant_id.is_none()) {
            return Err(ExportError::InvalidConfig(
                "service principal login needs client_id, client_secret and tenant_id".into(),
            ));
        }
        Ok(())
    }

    /// Container URL, either given directly or built from account + container
    pub fn container_url(&self) -> Option<String> {
        self.container_url.clone().or_else(|| {
            match (&self.storage_account, &self.container) {
                (Some(account), Some(container)) => Some(format!(
                    "https://{}.blob.core.windows.net/{}",
                    account, container
                )),
                _ => None,
            }
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AzureFormat {
    /// Per-disk VHD download
    #[default]
    Vhd,
    /// Managed image created from the generalized VM
    Image,
}

impl AzureFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AzureFormat::Vhd => "vhd",
            AzureFormat::Image => "image",
        }
    }
}

impl std::str::FromStr for AzureFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vhd" => Ok(AzureFormat::Vhd),
            "image" => Ok(AzureFormat::Image),
            other => Err(ExportError::InvalidOptions(format!(
                "format must be 'vhd' or 'image', got '{}'",
                other
            ))),
        }
    }
}

/// Export options projected from [`ExportOptions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureExportOptions {
    pub format: AzureFormat,
    pub output_dir: PathBuf,
    pub container_url: Option<String>,
    pub copy_to_blob: bool,
    pub download_local: bool,
    pub revoke_access: bool,
    pub access_duration: Duration,
    pub deallocate: bool,
    pub generalize: bool,
    pub parallel_disks: usize,
    pub transfer: TransferOptions,
}

impl AzureExportOptions {
    /// Project and validate; invalid combinations fail before any cloud call
    pub fn from_export_options(opts: &ExportOptions, config: &AzureConfig) -> Result<Self> {
        opts.validate()?;
        let meta = &opts.metadata;

        let format = match (opts.format.as_str(), meta.get_str("export_format")) {
            ("", None) | ("", Some("")) => config.export_format,
            ("", Some(f)) | (f, _) => f.parse()?,
        };
        let container_url = non_empty(meta.get_str("container_url")).or_else(|| config.container_url());

        let parsed = Self {
            format,
            output_dir: opts.output_path.clone(),
            copy_to_blob: meta.get_bool_or("copy_to_blob", container_url.is_some())?,
            container_url,
            download_local: meta.get_bool_or("download_local", true)?,
            revoke_access: meta.get_bool_or("revoke_access", true)?,
            access_duration: meta.get_secs_or("access_duration_secs", DEFAULT_ACCESS_DURATION)?,
            deallocate: meta.get_bool_or("deallocate", true)?,
            generalize: meta.get_bool_or("generalize", true)?,
            parallel_disks: opts.parallelism(),
            transfer: opts.transfer_options()?,
        };
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ExportError::InvalidOptions(msg.to_string()));
        if self.format == AzureFormat::Image {
            return Ok(());
        }
        if self.download_local && self.output_dir.as_os_str().is_empty() {
            return invalid("output path cannot be empty when downloading locally");
        }
        if self.copy_to_blob && self.container_url.is_none() {
            return invalid("container URL is required to copy to blob storage");
        }
        if !self.copy_to_blob && !self.download_local {
            return invalid("nothing to do: enable download_local or copy_to_blob");
        }
        if self.access_duration.is_zero() {
            return invalid("access duration must be greater than zero");
        }
        Ok(())
    }
}
