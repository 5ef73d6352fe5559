//! Azure provider implementation

use crate::api::{AzVm, AzureApi};
use crate::az::AzCli;
use crate::export;
use crate::options::{AzureConfig, AzureExportOptions};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use vmexport_core::{
    CancelToken, ExportCapabilities, ExportError, ExportOptions, ExportResult, Provider,
    ProviderConfig, ProviderType, Result, Transfer, VmFilter, VmInfo, write_export_artifacts,
};

const VALIDATE_TIMEOUT: Duration = Duration::from_secs(30);

struct Session {
    config: AzureConfig,
    api: Arc<dyn AzureApi>,
}

/// Microsoft Azure provider
///
/// Exports managed disks as VHD files through time-bounded SAS grants.
#[derive(Default)]
pub struct AzureProvider {
    session: Option<Session>,
    api_override: Option<Arc<dyn AzureApi>>,
}

impl AzureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `api` instead of the `az` CLI once connected
    pub fn with_api(api: Arc<dyn AzureApi>) -> Self {
        Self {
            session: None,
            api_override: Some(api),
        }
    }

    pub fn capabilities() -> ExportCapabilities {
        ExportCapabilities {
            supported_formats: vec!["vhd".into(), "image".into()],
            supports_compression: false,
            supports_streaming: true,
            supports_snapshots: true,
            max_vm_size_gb: 4096,
            supported_targets: vec!["blob".into(), "local".into()],
        }
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(ExportError::NotConnected)
    }
}

fn to_vm_info(vm: &AzVm) -> VmInfo {
    let mut info = VmInfo::new(ProviderType::Azure, &vm.id, &vm.name);
    info.state = vm.power_state.clone().unwrap_or_default();
    info.location = vm.location.clone();
    info.guest_os = vm.os_type().unwrap_or_default().to_string();
    info.storage_gb = vm.storage_gb();
    info.ip_addresses = vm.ip_addresses();
    info.tags = vm.tags.clone().unwrap_or_default();
    info.created_at = vm.time_created;

    let meta = &mut info.metadata;
    meta.insert("vm_size".into(), vm.vm_size().unwrap_or_default().into());
    meta.insert("os_type".into(), vm.os_type().unwrap_or_default().into());
    meta.insert(
        "provisioning_state".into(),
        vm.provisioning_state.clone().unwrap_or_default().into(),
    );
    meta.insert("resource_group".into(), vm.resource_group().into());
    meta.insert("disk_names".into(), vm.disk_names().into());
    if let Some(vm_id) = &vm.vm_id {
        meta.insert("vm_id".into(), vm_id.clone().into());
    }
    if let Some(image_id) = vm
        .storage_profile
        .image_reference
        .as_ref()
        .and_then(|r| r.id.clone())
    {
        meta.insert("image_id".into(), image_id.into());
    }
    info
}

#[async_trait]
impl Provider for AzureProvider {
    fn name(&self) -> &str {
        "Microsoft Azure"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Azure
    }

    async fn connect(&mut self, config: &ProviderConfig) -> Result<()> {
        let azure_config = AzureConfig::from_provider_config(config)?;
        let api: Arc<dyn AzureApi> = match &self.api_override {
            Some(api) => Arc::clone(api),
            None => Arc::new(AzCli::new(azure_config.clone())?),
        };
        api.login().await?;

        tracing::info!(
            subscription = azure_config.subscription_id.as_deref().unwrap_or("<default>"),
            resource_group = azure_config.resource_group.as_deref().unwrap_or("<all>"),
            location = %azure_config.location,
            "Connected to Azure"
        );
        self.session = Some(Session {
            config: azure_config,
            api,
        });
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.session = None;
        Ok(())
    }

    async fn validate_credentials(&self) -> Result<()> {
        let session = self.session()?;
        let account = tokio::time::timeout(VALIDATE_TIMEOUT, session.api.account())
            .await
            .map_err(|_| ExportError::Timeout("az account show".into()))??;
        tracing::debug!(subscription = %account.id, tenant = %account.tenant_id, "Azure credentials valid");
        Ok(())
    }

    async fn list_vms(&self, filter: &VmFilter) -> Result<Vec<VmInfo>> {
        let session = self.session()?;
        let vms = session.api.list_vms().await?;
        Ok(vms
            .iter()
            .map(to_vm_info)
            .filter(|vm| filter.matches(vm))
            .collect())
    }

    async fn get_vm(&self, identifier: &str) -> Result<VmInfo> {
        let session = self.session()?;
        Ok(to_vm_info(&session.api.get_vm(identifier).await?))
    }

    async fn export_vm(
        &self,
        identifier: &str,
        opts: &ExportOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<ExportResult>> {
        let session = self.session()?;
        opts.check_capabilities(&self.export_capabilities())?;
        let azure_opts = AzureExportOptions::from_export_options(opts, &session.config)?;

        let vm = cancel
            .run(async { session.api.get_vm(identifier).await.map_err(ExportError::from) })
            .await?;
        let transfer = Transfer::new(azure_opts.transfer.clone(), opts.progress_sink());

        let results =
            export::export_vm(session.api.as_ref(), &vm, &azure_opts, &transfer, cancel).await?;

        if !azure_opts.output_dir.as_os_str().is_empty() {
            write_export_artifacts(&to_vm_info(&vm), &results, &azure_opts.output_dir).await;
        }
        Ok(results)
    }

    fn export_capabilities(&self) -> ExportCapabilities {
        Self::capabilities()
    }
}
