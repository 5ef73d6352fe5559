//! Typed AWS connection settings and export options

use std::path::PathBuf;
use std::time::Duration;
use vmexport_core::{
    ExportError, ExportOptions, MetadataExt, ProviderConfig, Result, TransferOptions,
};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_S3_PREFIX: &str = "exports/instances/";
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(2 * 3600);
pub const TASK_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Connection settings projected from [`ProviderConfig`]
#[derive(Clone, Default, PartialEq, Eq)]
pub struct AwsConfig {
    pub region: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub session_token: Option<String>,
    /// Named profile from the AWS shared config
    pub profile: Option<String>,
    pub s3_bucket: Option<String>,
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for AwsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsConfig")
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "<redacted>"))
            .field("profile", &self.profile)
            .field("s3_bucket", &self.s3_bucket)
            .finish()
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_string)
}

impl AwsConfig {
    pub fn from_provider_config(config: &ProviderConfig) -> Result<Self> {
        let meta = &config.metadata;
        let cfg = Self {
            region: non_empty(meta.get_str("region"))
                .or_else(|| non_empty(config.region.as_deref()))
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            access_key: non_empty(meta.get_str("access_key"))
                .or_else(|| non_empty(config.username.as_deref())),
            secret_key: non_empty(meta.get_str("secret_key"))
                .or_else(|| non_empty(config.password.as_deref())),
            session_token: non_empty(meta.get_str("session_token")),
            profile: non_empty(meta.get_str("profile")),
            s3_bucket: non_empty(meta.get_str("s3_bucket")),
            timeout: config.timeout,
        };
        if cfg.access_key.is_some() != cfg.secret_key.is_some() {
            return Err(ExportError::InvalidConfig(
                "access_key and secret_key must be set together".to_string(),
            ));
        }
        Ok(cfg)
    }
}

/// Disk image formats an instance export task can produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AwsFormat {
    #[default]
    Vmdk,
    Vhd,
    Raw,
}

impl AwsFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AwsFormat::Vmdk => "vmdk",
            AwsFormat::Vhd => "vhd",
            AwsFormat::Raw => "raw",
        }
    }

    /// `--target-environment` matching the image format
    pub fn target_environment(&self) -> &'static str {
        match self {
            AwsFormat::Vhd => "microsoft",
            AwsFormat::Vmdk | AwsFormat::Raw => "vmware",
        }
    }
}

impl std::str::FromStr for AwsFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "vmdk" => Ok(AwsFormat::Vmdk),
            "vhd" => Ok(AwsFormat::Vhd),
            "raw" => Ok(AwsFormat::Raw),
            other => Err(ExportError::InvalidOptions(format!(
                "format must be 'vmdk', 'vhd' or 'raw', got '{}'",
                other
            ))),
        }
    }
}

/// Export options projected from [`ExportOptions`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsExportOptions {
    pub format: AwsFormat,
    pub output_dir: PathBuf,
    pub bucket: String,
    pub s3_prefix: String,
    pub download_local: bool,
    pub delete_from_s3: bool,
    pub export_timeout: Duration,
    pub transfer: TransferOptions,
}

impl AwsExportOptions {
    pub fn from_export_options(opts: &ExportOptions, config: &AwsConfig) -> Result<Self> {
        opts.validate()?;
        let meta = &opts.metadata;

        let format = if opts.format.is_empty() {
            AwsFormat::default()
        } else {
            opts.format.parse()?
        };
        let bucket = non_empty(meta.get_str("s3_bucket"))
            .or_else(|| config.s3_bucket.clone())
            .ok_or_else(|| {
                ExportError::InvalidOptions("S3 bucket cannot be empty (set s3_bucket)".to_string())
            })?;

        let parsed = Self {
            format,
            output_dir: opts.output_path.clone(),
            bucket,
            s3_prefix: meta.get_string_or("s3_prefix", DEFAULT_S3_PREFIX),
            download_local: meta.get_bool_or("download_from_s3", true)?,
            delete_from_s3: meta.get_bool_or("delete_from_s3", false)?,
            export_timeout: meta.get_secs_or("export_timeout_secs", DEFAULT_EXPORT_TIMEOUT)?,
            transfer: opts.transfer_options()?,
        };
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(ExportError::InvalidOptions(msg.to_string()));
        if self.download_local && self.output_dir.as_os_str().is_empty() {
            return invalid("output path cannot be empty when downloading from S3");
        }
        if self.export_timeout.is_zero() {
            return invalid("export timeout must be greater than zero");
        }
        if self.delete_from_s3 && !self.download_local {
            return invalid("delete_from_s3 requires download_from_s3");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vmexport_core::ProviderType;

    fn config() -> AwsConfig {
        AwsConfig::from_provider_config(
            &ProviderConfig::new(ProviderType::Aws).with_metadata("s3_bucket", json!("bkt")),
        )
        .unwrap()
    }

    #[test]
    fn test_config_projection() {
        let cfg = config();
        assert_eq!(cfg.region, "us-east-1");
        assert!(cfg.access_key.is_none());

        let mut base = ProviderConfig::new(ProviderType::Aws);
        base.username = Some("AKIA".into());
        base.password = Some("secret".into());
        base.region = Some("eu-west-1".into());
        let cfg = AwsConfig::from_provider_config(&base).unwrap();
        assert_eq!(cfg.access_key.as_deref(), Some("AKIA"));
        assert_eq!(cfg.region, "eu-west-1");
        assert!(!format!("{:?}", cfg).contains("secret"));

        let half = ProviderConfig::new(ProviderType::Aws).with_metadata("access_key", json!("AKIA"));
        assert!(AwsConfig::from_provider_config(&half).is_err());
    }

    #[test]
    fn test_export_option_defaults() {
        let opts = AwsExportOptions::from_export_options(&ExportOptions::new("/exports"), &config())
            .unwrap();
        assert_eq!(opts.format, AwsFormat::Vmdk);
        assert_eq!(opts.s3_prefix, "exports/instances/");
        assert_eq!(opts.export_timeout, Duration::from_secs(7200));
        assert!(opts.download_local);
        assert_eq!(AwsFormat::Vhd.target_environment(), "microsoft");
    }

    #[test]
    fn test_bucket_required() {
        let err = AwsExportOptions::from_export_options(
            &ExportOptions::new("/exports"),
            &AwsConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::InvalidOptions(_)));

        let from_options = ExportOptions::new("/exports").with_metadata("s3_bucket", json!("other"));
        let opts = AwsExportOptions::from_export_options(&from_options, &config()).unwrap();
        assert_eq!(opts.bucket, "other");
    }
}
