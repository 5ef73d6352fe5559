use vmexport_aws::AwsProvider;
use vmexport_azure::AzureProvider;
use vmexport_core::{ProviderRegistry, ProviderType};
use vmexport_gcp::GcpProvider;

/// Registry with every provider this build ships
pub fn default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(ProviderType::Azure, |_| Ok(Box::new(AzureProvider::new())));
    registry.register(ProviderType::Gcp, |_| Ok(Box::new(GcpProvider::new())));
    registry.register(ProviderType::Aws, |_| Ok(Box::new(AwsProvider::new())));
    registry
}
