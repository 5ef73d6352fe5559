//! GCP provider implementation

use crate::api::{GceInstance, GcpApi};
use crate::export;
use crate::gcloud::Gcloud;
use crate::options::{GcpConfig, GcpExportOptions};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use vmexport_core::{
    CancelToken, ExportCapabilities, ExportError, ExportOptions, ExportResult, Provider,
    ProviderConfig, ProviderType, Result, Transfer, VmFilter, VmInfo, write_export_artifacts,
};

const VALIDATE_TIMEOUT: Duration = Duration::from_secs(30);

struct Session {
    config: GcpConfig,
    api: Arc<dyn GcpApi>,
}

/// Google Cloud Platform provider
#[derive(Default)]
pub struct GcpProvider {
    session: Option<Session>,
    api_override: Option<Arc<dyn GcpApi>>,
}

impl GcpProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api(api: Arc<dyn GcpApi>) -> Self {
        Self {
            session: None,
            api_override: Some(api),
        }
    }

    pub fn capabilities() -> ExportCapabilities {
        ExportCapabilities {
            supported_formats: vec!["vmdk".into(), "image".into()],
            supports_compression: false,
            supports_streaming: true,
            supports_snapshots: true,
            max_vm_size_gb: 65536,
            supported_targets: vec!["gcs".into(), "local".into()],
        }
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(ExportError::NotConnected)
    }
}

fn to_vm_info(instance: &GceInstance) -> VmInfo {
    let id = if instance.id.is_empty() {
        &instance.name
    } else {
        &instance.id
    };
    let mut info = VmInfo::new(ProviderType::Gcp, id, &instance.name);
    info.state = instance.status.clone();
    info.location = instance.zone_name().to_string();
    info.guest_os = instance.guest_os().unwrap_or_default().to_string();
    info.storage_gb = instance.storage_gb();
    info.ip_addresses = instance.ip_addresses();
    info.tags = instance.labels.clone();
    info.created_at = instance.created_at();

    let meta = &mut info.metadata;
    meta.insert("machine_type".into(), instance.machine_type_name().into());
    meta.insert("disk_names".into(), instance.disk_names().into());
    meta.insert(
        "internal_ip".into(),
        instance.internal_ip().unwrap_or_default().into(),
    );
    meta.insert(
        "external_ip".into(),
        instance.external_ip().unwrap_or_default().into(),
    );
    if let Some(ts) = &instance.creation_timestamp {
        meta.insert("creation_timestamp".into(), ts.clone().into());
    }
    info
}

#[async_trait]
impl Provider for GcpProvider {
    fn name(&self) -> &str {
        "Google Cloud Platform"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Gcp
    }

    async fn connect(&mut self, config: &ProviderConfig) -> Result<()> {
        let gcp_config = GcpConfig::from_provider_config(config)?;
        let api: Arc<dyn GcpApi> = match &self.api_override {
            Some(api) => Arc::clone(api),
            None => Arc::new(Gcloud::new(gcp_config.clone())?),
        };

        tracing::info!(project = %gcp_config.project_id, zone = %gcp_config.zone, "Connected to GCP");
        self.session = Some(Session {
            config: gcp_config,
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
        tokio::time::timeout(VALIDATE_TIMEOUT, session.api.validate())
            .await
            .map_err(|_| ExportError::Timeout("gcloud compute instances list".into()))??;
        Ok(())
    }

    async fn list_vms(&self, filter: &VmFilter) -> Result<Vec<VmInfo>> {
        let session = self.session()?;
        let instances = session.api.list_instances().await?;
        Ok(instances
            .iter()
            .map(to_vm_info)
            .filter(|vm| filter.matches(vm))
            .collect())
    }

    async fn get_vm(&self, identifier: &str) -> Result<VmInfo> {
        let session = self.session()?;
        Ok(to_vm_info(&session.api.get_instance(identifier).await?))
    }

    async fn export_vm(
        &self,
        identifier: &str,
        opts: &ExportOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<ExportResult>> {
        let session = self.session()?;
        opts.check_capabilities(&self.export_capabilities())?;
        let gcp_opts = GcpExportOptions::from_export_options(opts, &session.config)?;

        let instance = cancel
            .run(async {
                session
                    .api
                    .get_instance(identifier)
                    .await
                    .map_err(ExportError::from)
            })
            .await?;
        let transfer = Transfer::new(gcp_opts.transfer.clone(), opts.progress_sink());

        let results =
            export::export_vm(session.api.as_ref(), &instance, &gcp_opts, &transfer, cancel)
                .await?;

        if !gcp_opts.output_dir.as_os_str().is_empty() {
            write_export_artifacts(&to_vm_info(&instance), &results, &gcp_opts.output_dir).await;
        }
        Ok(results)
    }

    fn export_capabilities(&self) -> ExportCapabilities {
        Self::capabilities()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockGcp;
    use serde_json::json;
    use tempfile::TempDir;
    use vmexport_core::load_export_manifest;

    fn config() -> ProviderConfig {
        ProviderConfig::new(ProviderType::Gcp)
            .with_metadata("project_id", json!("my-project"))
            .with_metadata("gcs_bucket", json!("bkt"))
    }

    fn provider() -> GcpProvider {
        GcpProvider::with_api(Arc::new(MockGcp::with_instance(
            "web-01",
            &[("web-01", 1024), ("data", 256)],
        )))
    }

    #[tokio::test]
    async fn test_not_connected() {
        let provider = provider();
        assert!(matches!(
            provider.get_vm("web-01").await,
            Err(ExportError::NotConnected)
        ));
        assert!(matches!(
            provider.search_vms("web").await,
            Err(ExportError::NotConnected)
        ));
        assert_eq!(provider.name(), "Google Cloud Platform");
    }

    #[tokio::test]
    async fn test_connect_requires_project() {
        let mut provider = provider();
        let err = provider
            .connect(&ProviderConfig::new(ProviderType::Gcp))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::InvalidConfig(_)));
        assert!(matches!(
            provider.list_vms(&VmFilter::default()).await,
            Err(ExportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_discovery() {
        let mut provider = provider();
        provider.connect(&config()).await.unwrap();
        provider.validate_credentials().await.unwrap();

        let vm = provider.get_vm("web-01").await.unwrap();
        assert_eq!(vm.id, "1234567890");
        assert_eq!(vm.location, "us-central1-a");
        assert_eq!(vm.state, "RUNNING");
        assert_eq!(vm.disk_names(), vec!["web-01", "data"]);
        assert_eq!(vm.metadata["machine_type"], json!("e2-medium"));

        assert_eq!(provider.search_vms("E2-MEDIUM").await.unwrap().len(), 1);
        assert_eq!(provider.search_vms("platform").await.unwrap().len(), 1);
        assert!(provider.search_vms("europe").await.unwrap().is_empty());

        let filter = VmFilter {
            state: Some("TERMINATED".into()),
            ..Default::default()
        };
        assert!(provider.list_vms(&filter).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_export_writes_manifest() {
        let dir = TempDir::new().unwrap();
        let mut provider = provider();
        provider.connect(&config()).await.unwrap();

        let results = provider
            .export_vm("web-01", &ExportOptions::new(dir.path()), &CancelToken::new())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].disk_type, "boot");
        assert_eq!(results[0].size_bytes, 1024);

        let manifest = load_export_manifest(&dir.path().join("web-01-manifest.json"))
            .await
            .unwrap();
        assert_eq!(manifest.disk_count, 2);
        assert_eq!(manifest.disks[0].gcs_bucket.as_deref(), Some("bkt"));

        let metadata: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("web-01-metadata.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(metadata["vm_size"], json!("e2-medium"));
        assert_eq!(metadata["provider"], json!("gcp"));
    }
}
