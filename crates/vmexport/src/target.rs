//! Maps `--profile` / `--provider` onto a provider connection config

use anyhow::{Context, bail};
use vmexport_config::VmexportConfig;
use vmexport_core::{ProviderConfig, ProviderType};

/// Which provider to talk to and how
#[derive(Debug, Clone)]
pub struct Target {
    /// Profile the config came from, if any
    pub profile: Option<String>,
    pub provider_type: ProviderType,
    pub config: ProviderConfig,
}

/// Resolve the target of a command
///
/// `--provider` alone picks the first profile of that type, or a bare config
/// relying on the provider CLI's own login. Without `--provider` a profile
/// is required (named, `default_profile`, or the only one defined).
pub fn resolve_target(
    config: Option<&VmexportConfig>,
    profile: Option<&str>,
    provider: Option<&str>,
) -> anyhow::Result<Target> {
    let provider_type = provider.map(str::parse::<ProviderType>).transpose()?;

    let selected = match (config, profile, provider_type) {
        (Some(config), Some(_), _) | (Some(config), None, None) => Some(config.profile(profile)?),
        (Some(config), None, Some(t)) => config.profile_for_type(t),
        (None, Some(name), _) => bail!("Profile '{}' requested but no config file was found", name),
        (None, None, Some(_)) => None,
        (None, None, None) => {
            bail!("No config file found; pass --provider or create vmexport.yaml")
        }
    };

    match selected {
        Some((name, profile)) => {
            if let Some(t) = provider_type {
                if t != profile.provider {
                    bail!(
                        "Profile '{}' is a {} profile, not {}",
                        name,
                        profile.provider,
                        t
                    );
                }
            }
            let config = profile
                .to_provider_config(name)
                .with_context(|| format!("Failed to load profile '{}'", name))?;
            Ok(Target {
                profile: Some(name.to_string()),
                provider_type: profile.provider,
                config,
            })
        }
        None => {
            // Only reachable with --provider set
            let t = provider_type.context("No provider selected")?;
            Ok(Target {
                profile: None,
                provider_type: t,
                config: ProviderConfig::new(t),
            })
        }
    }
}
