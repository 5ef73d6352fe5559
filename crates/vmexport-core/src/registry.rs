//! Provider factory registry

use crate::error::{ExportError, Result};
use crate::provider::{ExportCapabilities, Provider, ProviderConfig, ProviderType};
use std::collections::HashMap;
use std::sync::Arc;

/// Builds an unconnected provider from its configuration
pub type ProviderFactory =
    Arc<dyn Fn(&ProviderConfig) -> Result<Box<dyn Provider>> + Send + Sync>;

/// Maps provider types to factories
///
/// The set of providers is fixed when the binary is built; the registry only
/// decides which of them a given process exposes.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    factories: HashMap<ProviderType, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `provider_type`
    pub fn register<F>(&mut self, provider_type: ProviderType, factory: F)
    where
        F: Fn(&ProviderConfig) -> Result<Box<dyn Provider>> + Send + Sync + 'static,
    {
        tracing::debug!(provider = %provider_type, "Registering provider factory");
        self.factories.insert(provider_type, Arc::new(factory));
    }

    pub fn unregister(&mut self, provider_type: ProviderType) -> bool {
        self.factories.remove(&provider_type).is_some()
    }

    pub fn is_registered(&self, provider_type: ProviderType) -> bool {
        self.factories.contains_key(&provider_type)
    }

    /// Registered provider types, sorted by name
    pub fn list_providers(&self) -> Vec<ProviderType> {
        let mut types: Vec<_> = self.factories.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }

    /// Instantiate a provider. The type is written into the config handed to
    /// the factory so providers can rely on it.
    pub fn create(
        &self,
        provider_type: ProviderType,
        config: &ProviderConfig,
    ) -> Result<Box<dyn Provider>> {
        let factory = self
            .factories
            .get(&provider_type)
            .ok_or_else(|| ExportError::UnknownProvider(provider_type.to_string()))?;

        let mut config = config.clone();
        config.provider_type = Some(provider_type);
        factory(&config)
    }

    /// Parse `name` and instantiate the matching provider
    pub fn create_by_name(&self, name: &str, config: &ProviderConfig) -> Result<Box<dyn Provider>> {
        self.create(name.parse()?, config)
    }

    /// Capability query without a live connection
    pub fn get_capabilities(&self, provider_type: ProviderType) -> Result<ExportCapabilities> {
        let provider = self.create(provider_type, &ProviderConfig::new(provider_type))?;
        Ok(provider.export_capabilities())
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list_providers())
            .finish()
    }
}
