use colored::Colorize;
use vmexport_core::{ProviderConfig, ProviderRegistry};

pub fn handle(registry: &ProviderRegistry) -> anyhow::Result<()> {
    println!(
        "{}",
        format!(
            "{:<8} {:<26} {:<16} {:<14} {:<8}",
            "TYPE", "NAME", "FORMATS", "TARGETS", "MAX GB"
        )
        .bold()
    );
    println!("{}", "─".repeat(76).dimmed());

    for provider_type in registry.list_providers() {
        let provider = registry.create(provider_type, &ProviderConfig::new(provider_type))?;
        let caps = provider.export_capabilities();
        let max = if caps.max_vm_size_gb == 0 {
            "-".to_string()
        } else {
            caps.max_vm_size_gb.to_string()
        };
        println!(
            "{:<8} {:<26} {:<16} {:<14} {:<8}",
            provider_type.as_str().cyan(),
            provider.name(),
            caps.supported_formats.join(","),
            caps.supported_targets.join(","),
            max
        );
    }
    Ok(())
}
