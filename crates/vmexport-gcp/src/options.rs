//! Typed GCP connection settings and export options

use std::path::PathBuf;
use std::time::Duration;
use vmexport_core::{
    ExportError, ExportOptions, MetadataExt, ProviderConfig, Result, TransferOptions,
};

pub const DEFAULT_ZONE: &str = "us-central1-a";
pub const DEFAULT_REGION: &str = "us-central1";
pub const DEFAULT_GCS_PREFIX: &str = "exports/";
pub const DEFAULT_IMAGE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Connection settings projected from [`ProviderConfig`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcpConfig {
    pub project_id: String,
    pub zone: String,
    pub region: String,
    /// Service account key file; the active gcloud account is used when unset
    pub credentials_json: Option<String>,
    pub gcs_bucket: Option<String>,
    pub timeout: Option<Duration>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}

impl GcpConfig {
    pub fn from_provider_config(config: &ProviderConfig) -> Result<Self> {
        let meta = &config.metadata;
        let project_id = non_empty(meta.get_str("project_id")).ok_or_else(|| {
            ExportError::InvalidConfig("GCP project_id is required".to_string())
        })?;

        Ok(Self {
            project_id,
            zone: non_empty(meta.get_str("zone")).unwrap_or_else(|| DEFAULT_ZONE.to_string()),
            region: non_empty(meta.get_str("region"))
                .or_else(|| non_empty(config.region.as_deref()))
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            credentials_json: non_empty(meta.get_str("credentials_json"))
                .or_else(|| non_empty(config.password.as_deref())),
            gcs_bucket: non_empty(meta.get_str("gcs_bucket")),
            timeout: config.timeout,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GcpFormat {
    #[default]
    Vmdk,
    Raw,
    /// Stop after creating a disk image per disk
    Image,
}

impl GcpFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            GcpFormat::Vmdk => "vmdk",
            GcpFormat::Raw => "raw",
            GcpFormat::Image => "image",
        }
    }

    /// Object extension; raw exports are written as a gzipped tarball
    pub fn extension(&self) -> &'static str {
        match self {
            GcpFormat::Vmdk => "vmdk",
            GcpFormat::Raw => "tar.gz",
            GcpFormat::Image => "image",
        }
    }
}

impl std::str::FromStr for GcpFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vmdk" => Ok(GcpFormat::Vmdk),
            "raw" => Ok(GcpFormat::Raw),
            "image" => Ok(GcpFormat::Image),
            other => Err(ExportError::InvalidOptions(format!(
                "format must be 'vmdk', 'raw' or 'image', got '{}'",
                other
            ))),
        }
    }
}

/// Export options projected from [`ExportOptions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpExportOptions {
    pub format: GcpFormat,
    pub output_dir: PathBuf,
    pub bucket: Option<String>,
    pub gcs_prefix: String,
    pub download_local: bool,
    pub delete_from_gcs: bool,
    pub image_timeout: Duration,
    pub parallel_disks: usize,
    pub transfer: TransferOptions,
}

impl GcpExportOptions {
    pub fn from_export_options(opts: &ExportOptions, config: &GcpConfig) -> Result<Self> {
        opts.validate()?;
        let meta = &opts.metadata;

        let format = if opts.format.is_empty() {
            GcpFormat::default()
        } else {
            opts.format.parse()?
        };

        let parsed = Self {
            format,
            output_dir: opts.output_path.clone(),
            bucket: non_empty(meta.get_str("gcs_bucket")).or_else(|| config.gcs_bucket.clone()),
            gcs_prefix: meta.get_string_or("gcs_prefix", DEFAULT_GCS_PREFIX),
            download_local: meta.get_bool_or("download_from_gcs", true)?,
            delete_from_gcs: meta.get_bool_or("delete_from_gcs", false)?,
            image_timeout: meta.get_secs_or("image_timeout_secs", DEFAULT_IMAGE_TIMEOUT)?,
            parallel_disks: opts.parallelism(),
            transfer: opts.transfer_options()?,
        };
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ExportError::InvalidOptions(msg.to_string()));
        if self.image_timeout.is_zero() {
            return invalid("image timeout must be greater than zero");
        }
        if self.format == GcpFormat::Image {
            return Ok(());
        }
        if self.bucket.is_none() {
            return invalid("GCS bucket cannot be empty (set gcs_bucket)");
        }
        if self.download_local && self.output_dir.as_os_str().is_empty() {
            return invalid("output path cannot be empty when downloading from GCS");
        }
        if self.delete_from_gcs && !self.download_local {
            return invalid("delete_from_gcs requires download_from_gcs");
        }
        Ok(())
    }

    /// Object name for an exported image, under the configured prefix
    pub fn object_name(&self, image_name: &str) -> String {
        format!("{}{}.{}", self.gcs_prefix, image_name, self.format.extension())
    }
}
