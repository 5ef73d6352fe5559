pub mod export;
pub mod list;
pub mod providers;
pub mod show;
pub mod validate;

use anyhow::Context;
use colored::Colorize;
use vmexport::Target;
use vmexport_core::{Provider, ProviderRegistry};

/// Instantiate and connect the target's provider
pub async fn connect(
    registry: &ProviderRegistry,
    target: &Target,
) -> anyhow::Result<Box<dyn Provider>> {
    let mut provider = registry.create(target.provider_type, &target.config)?;
    let name = provider.name().to_string();

    match &target.profile {
        Some(profile) => eprintln!(
            "{} {} (profile {})",
            "Connecting to".blue(),
            name.cyan(),
            profile.cyan()
        ),
        None => eprintln!("{} {}", "Connecting to".blue(), name.cyan()),
    }
    provider
        .connect(&target.config)
        .await
        .with_context(|| format!("Failed to connect to {}", name))?;
    Ok(provider)
}
