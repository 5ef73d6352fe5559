//! Config file schema: provider profiles and transfer defaults

use crate::cost::CostSettings;
use crate::error::{ConfigError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use vmexport_core::{ExportOptions, ProviderConfig, ProviderType};

/// Root of `vmexport.yaml`
///
/// ```yaml
/// default_profile: azure-prod
/// providers:
///   azure-prod:
///     type: azure
///     region: westeurope
///     metadata:
///       subscription_id: 00000000-0000-0000-0000-000000000000
///       resource_group: prod-rg
///   aws:
///     type: aws
///     username: AKIA...
///     password_env: AWS_SECRET_ACCESS_KEY
///     metadata:
///       s3_bucket: vm-exports
/// transfer:
///   parallel_disks: 2
///   bandwidth_limit: 52428800
///   enable_checkpoints: true
/// costs:
///   rates:
///     - provider: azure
///       storage_class: hot
///       per_gb_month: 0.02
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct VmexportConfig {
    pub default_profile: Option<String>,
    pub providers: BTreeMap<String, ProfileConfig>,
    pub transfer: TransferDefaults,
    pub costs: CostSettings,
}

impl VmexportConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content, path)?;
        tracing::debug!(path = %path.display(), profiles = config.providers.len(), "Loaded config");
        Ok(config)
    }

    /// Parse YAML; `origin` only labels errors
    pub fn parse(content: &str, origin: &Path) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(default) = &self.default_profile {
            if !self.providers.contains_key(default) {
                return Err(ConfigError::ProfileNotFound(default.clone()));
            }
        }
        for (name, profile) in &self.providers {
            if profile.password.is_some() && profile.password_env.is_some() {
                return Err(ConfigError::InvalidProfile {
                    profile: name.clone(),
                    message: "set either password or password_env, not both".to_string(),
                });
            }
            if profile.timeout_secs == Some(0) {
                return Err(ConfigError::InvalidProfile {
                    profile: name.clone(),
                    message: "timeout_secs must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Look up a profile by name, falling back to `default_profile` and then
    /// to the only profile defined
    pub fn profile(&self, name: Option<&str>) -> Result<(&str, &ProfileConfig)> {
        let wanted = name.or(self.default_profile.as_deref());
        match wanted {
            Some(name) => self
                .providers
                .get_key_value(name)
                .map(|(k, v)| (k.as_str(), v))
                .ok_or_else(|| ConfigError::ProfileNotFound(name.to_string())),
            None if self.providers.len() == 1 => self
                .providers
                .iter()
                .next()
                .map(|(k, v)| (k.as_str(), v))
                .ok_or(ConfigError::NoDefaultProfile),
            None => Err(ConfigError::NoDefaultProfile),
        }
    }

    /// First profile (in name order) for a provider type
    pub fn profile_for_type(&self, provider: ProviderType) -> Option<(&str, &ProfileConfig)> {
        self.providers
            .iter()
            .find(|(_, p)| p.provider == provider)
            .map(|(k, v)| (k.as_str(), v))
    }
}

/// One named connection profile
#[derive(Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ProfileConfig {
    #[serde(rename = "type")]
    pub provider: ProviderType,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Environment variable holding the password
    #[serde(default)]
    pub password_env: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl fmt::Debug for ProfileConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfileConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("password_env", &self.password_env)
            .field("region", &self.region)
            .field("metadata_keys", &self.metadata.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProfileConfig {
    /// Build the connection config, reading `password_env` from the
    /// environment
    pub fn to_provider_config(&self, profile: &str) -> Result<ProviderConfig> {
        let password = match &self.password_env {
            Some(var) => Some(std::env::var(var).map_err(|_| ConfigError::MissingSecret {
                profile: profile.to_string(),
                var: var.clone(),
            })?),
            None => self.password.clone(),
        };

        let mut config = ProviderConfig::new(self.provider);
        config.endpoint = self.endpoint.clone();
        config.host = self.host.clone();
        config.port = self.port;
        config.username = self.username.clone();
        config.password = password;
        config.region = self.region.clone();
        config.insecure = self.insecure;
        config.timeout = self.timeout_secs.map(Duration::from_secs);
        config.metadata = self
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(config)
    }
}

/// Transfer settings applied to every export unless overridden
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct TransferDefaults {
    pub parallel_disks: Option<usize>,
    /// Bytes per second
    pub bandwidth_limit: Option<u64>,
    pub bandwidth_burst: Option<u64>,
    pub enable_checkpoints: Option<bool>,
    pub checkpoint_interval_secs: Option<u64>,
    pub resume_from_checkpoint: Option<bool>,
    pub checkpoint_dir: Option<PathBuf>,
}

impl TransferDefaults {
    /// Fill in whatever `opts` leaves unset
    pub fn apply(&self, opts: &mut ExportOptions) {
        if opts.parallel_disks == 0 {
            if let Some(n) = self.parallel_disks {
                opts.parallel_disks = n;
            }
        }

        let entries = [
            ("bandwidth_limit", self.bandwidth_limit.map(serde_json::Value::from)),
            ("bandwidth_burst", self.bandwidth_burst.map(serde_json::Value::from)),
            ("enable_checkpoints", self.enable_checkpoints.map(serde_json::Value::from)),
            (
                "checkpoint_interval_secs",
                self.checkpoint_interval_secs.map(serde_json::Value::from),
            ),
            (
                "resume_from_checkpoint",
                self.resume_from_checkpoint.map(serde_json::Value::from),
            ),
            (
                "checkpoint_path",
                self.checkpoint_dir
                    .as_ref()
                    .map(|p| serde_json::Value::from(p.to_string_lossy().into_owned())),
            ),
        ];
        for (key, value) in entries {
            if let Some(value) = value {
                opts.metadata.entry(key.to_string()).or_insert(value);
            }
        }
    }
}
