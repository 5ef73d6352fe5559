//! AWS EC2 provider implementation

use crate::api::{AwsApi, Ec2Instance};
use crate::awscli::AwsCli;
use crate::export;
use crate::options::{AwsConfig, AwsExportOptions};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use vmexport_core::{
    CancelToken, ExportCapabilities, ExportError, ExportOptions, ExportResult, Provider,
    ProviderConfig, ProviderType, Result, Transfer, VmFilter, VmInfo, write_export_artifacts,
};

const VALIDATE_TIMEOUT: Duration = Duration::from_secs(30);

struct Session {
    config: AwsConfig,
    api: Arc<dyn AwsApi>,
}

/// Amazon EC2 provider
///
/// Runs instance export tasks into S3 and downloads the resulting image.
#[derive(Default)]
pub struct AwsProvider {
    session: Option<Session>,
    api_override: Option<Arc<dyn AwsApi>>,
}

impl AwsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api(api: Arc<dyn AwsApi>) -> Self {
        Self {
            session: None,
            api_override: Some(api),
        }
    }

    pub fn capabilities() -> ExportCapabilities {
        ExportCapabilities {
            supported_formats: vec!["vmdk".into(), "vhd".into(), "raw".into()],
            supports_compression: false,
            supports_streaming: true,
            supports_snapshots: true,
            max_vm_size_gb: 1000,
            supported_targets: vec!["s3".into(), "local".into()],
        }
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(ExportError::NotConnected)
    }
}

fn to_vm_info(instance: &Ec2Instance, region: &str) -> VmInfo {
    let mut info = VmInfo::new(ProviderType::Aws, &instance.instance_id, instance.name());
    info.state = instance.state_name().to_string();
    info.location = instance.availability_zone().to_string();
    info.guest_os = instance.os().to_string();
    info.num_cpus = instance.vcpus();
    info.ip_addresses = instance.ip_addresses();
    info.tags = instance.tag_map();
    info.created_at = instance.launch_time;

    let meta = &mut info.metadata;
    meta.insert("instance_type".into(), instance.instance_type.clone().into());
    meta.insert("region".into(), region.into());
    meta.insert("disk_names".into(), instance.volume_ids().into());
    if let Some(image_id) = &instance.image_id {
        meta.insert("image_id".into(), image_id.clone().into());
    }
    if let Some(ip) = &instance.private_ip_address {
        meta.insert("private_ip".into(), ip.clone().into());
    }
    if let Some(ip) = &instance.public_ip_address {
        meta.insert("public_ip".into(), ip.clone().into());
    }
    info
}

#[async_trait]
impl Provider for AwsProvider {
    fn name(&self) -> &str {
        "Amazon Web Services EC2"
    }

    fn provider_type(&self) -> ProviderType {
        ProviderType::Aws
    }

    async fn connect(&mut self, config: &ProviderConfig) -> Result<()> {
        let aws_config = AwsConfig::from_provider_config(config)?;
        let api: Arc<dyn AwsApi> = match &self.api_override {
            Some(api) => Arc::clone(api),
            None => Arc::new(AwsCli::new(&aws_config)?),
        };

        tracing::info!(
            region = %aws_config.region,
            profile = aws_config.profile.as_deref().unwrap_or("<default>"),
            "Connected to AWS"
        );
        self.session = Some(Session {
            config: aws_config,
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
        let identity = tokio::time::timeout(VALIDATE_TIMEOUT, session.api.caller_identity())
            .await
            .map_err(|_| ExportError::Timeout("aws sts get-caller-identity".into()))??;
        tracing::debug!(account = %identity.account, arn = %identity.arn, "AWS credentials valid");
        Ok(())
    }

    async fn list_vms(&self, filter: &VmFilter) -> Result<Vec<VmInfo>> {
        let session = self.session()?;
        let instances = session.api.list_instances().await?;
        Ok(instances
            .iter()
            .map(|i| to_vm_info(i, &session.config.region))
            .filter(|vm| filter.matches(vm))
            .collect())
    }

    async fn get_vm(&self, identifier: &str) -> Result<VmInfo> {
        let session = self.session()?;
        let instance = session.api.get_instance(identifier).await?;
        Ok(to_vm_info(&instance, &session.config.region))
    }

    async fn export_vm(
        &self,
        identifier: &str,
        opts: &ExportOptions,
        cancel: &CancelToken,
    ) -> Result<Vec<ExportResult>> {
        let session = self.session()?;
        opts.check_capabilities(&self.export_capabilities())?;
        let aws_opts = AwsExportOptions::from_export_options(opts, &session.config)?;

        let instance = cancel
            .run(async { session.api.get_instance(identifier).await.map_err(ExportError::from) })
            .await?;
        let transfer = Transfer::new(aws_opts.transfer.clone(), opts.progress_sink());

        let results =
            export::export_vm(session.api.as_ref(), &instance, &aws_opts, &transfer, cancel).await?;

        if !aws_opts.output_dir.as_os_str().is_empty() {
            let info = to_vm_info(&instance, &session.config.region);
            write_export_artifacts(&info, &results, &aws_opts.output_dir).await;
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
    use crate::mock::MockAws;
    use serde_json::json;
    use tempfile::TempDir;
    use vmexport_core::load_export_manifest;

    fn config() -> ProviderConfig {
        ProviderConfig::new(ProviderType::Aws).with_metadata("s3_bucket", json!("bkt"))
    }

    fn provider() -> AwsProvider {
        AwsProvider::with_api(Arc::new(MockAws::with_instance("i-0abc", "web-01", 256)))
    }

    #[tokio::test]
    async fn test_not_connected() {
        let provider = provider();
        assert!(matches!(
            provider.get_vm("i-0abc").await,
            Err(ExportError::NotConnected)
        ));
        assert!(matches!(
            provider.validate_credentials().await,
            Err(ExportError::NotConnected)
        ));
        assert!(provider.export_capabilities().supports_format("vhd"));
        assert!(!provider.export_capabilities().supports_format("qcow2"));
    }

    #[tokio::test]
    async fn test_discovery() {
        let mut provider = provider();
        provider.connect(&config()).await.unwrap();
        provider.validate_credentials().await.unwrap();

        let vms = provider.list_vms(&VmFilter::default()).await.unwrap();
        assert_eq!(vms.len(), 1);
        let vm = &vms[0];
        assert_eq!(vm.id, "i-0abc");
        assert_eq!(vm.name, "web-01");
        assert_eq!(vm.num_cpus, 2);
        assert_eq!(vm.location, "us-east-1a");
        assert_eq!(vm.disk_names(), vec!["vol-root", "vol-data"]);
        assert_eq!(vm.metadata["instance_type"], json!("t3.medium"));

        // Lookup by Name tag resolves to the same instance
        assert_eq!(provider.get_vm("web-01").await.unwrap().id, "i-0abc");
        assert_eq!(provider.search_vms("STAGING").await.unwrap().len(), 1);
        assert!(matches!(
            provider.get_vm("i-missing").await,
            Err(ExportError::VmNotFound(_))
        ));
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
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].size_bytes, 256);

        let manifest = load_export_manifest(&dir.path().join("web-01-manifest.json"))
            .await
            .unwrap();
        assert_eq!(manifest.disk_count, 1);
        assert_eq!(manifest.disks[0].disk_type, "boot");
    }

    #[tokio::test]
    async fn test_export_rejects_compression() {
        let mock = Arc::new(MockAws::with_instance("i-0abc", "web-01", 256));
        let mut provider = AwsProvider::with_api(mock.clone());
        provider.connect(&config()).await.unwrap();

        let mut opts = ExportOptions::new("/tmp");
        opts.compress = true;
        let err = provider
            .export_vm("web-01", &opts, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::InvalidOptions(msg) if msg.contains("compression")));
        assert_eq!(mock.count("create"), 0);
    }

    #[tokio::test]
    async fn test_export_requires_bucket() {
        let mut provider = provider();
        provider
            .connect(&ProviderConfig::new(ProviderType::Aws))
            .await
            .unwrap();
        let err = provider
            .export_vm("web-01", &ExportOptions::new("/tmp"), &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::InvalidOptions(_)));
    }
}
