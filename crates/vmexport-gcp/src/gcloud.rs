//! gcloud CLI wrapper
//!
//! Compute operations run through `gcloud`; object downloads go straight to
//! the Cloud Storage JSON API with a token from `gcloud auth print-access-token`.

use crate::api::{GceDisk, GceInstance, GcpApi};
use crate::error::{GcpError, Result};
use crate::options::{GcpConfig, GcpFormat};
use async_trait::async_trait;
use vmexport_core::cli::{CliError, CliRunner};
use vmexport_core::{ByteSource, HttpSource};

const STORAGE_API: &str = "https://storage.googleapis.com/storage/v1/b";

/// Points gcloud at a service account key without touching its global state
const CREDENTIAL_OVERRIDE_ENV: &str = "CLOUDSDK_AUTH_CREDENTIAL_FILE_OVERRIDE";

/// `gcloud` backed implementation of [`GcpApi`]
pub struct Gcloud {
    cli: CliRunner,
    auth: CliRunner,
    config: GcpConfig,
    http: reqwest::Client,
}

fn classify(err: CliError, resource: &str) -> GcpError {
    let stderr = err.stderr();
    if stderr.contains("gcloud auth login")
        || stderr.contains("Reauthentication")
        || stderr.contains("does not have any valid credentials")
    {
        return GcpError::AuthenticationFailed(
            stderr.lines().next().unwrap_or_default().to_string(),
        );
    }
    if stderr.contains("was not found") || stderr.contains("notFound") {
        return GcpError::InstanceNotFound(resource.to_string());
    }
    GcpError::Cli(err)
}

/// JSON API media URL for an object; the object name is a single path segment
pub fn object_media_url(bucket: &str, object: &str) -> Result<String> {
    let mut url = reqwest::Url::parse(STORAGE_API)
        .map_err(|e| GcpError::InvalidConfig(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| GcpError::InvalidConfig(format!("cannot build URL for gs://{}", bucket)))?
        .push(bucket)
        .push("o")
        .push(object);
    url.set_query(Some("alt=media"));
    Ok(url.to_string())
}

impl Gcloud {
    pub fn new(config: GcpConfig) -> Result<Self> {
        let mut cli = CliRunner::new("gcloud").with_global_args([
            "--format=json".to_string(),
            "--quiet".to_string(),
            format!("--project={}", config.project_id),
        ]);
        let mut auth = CliRunner::new("gcloud");
        if let Some(key_file) = &config.credentials_json {
            cli = cli.with_env(CREDENTIAL_OVERRIDE_ENV, key_file.clone());
            auth = auth.with_env(CREDENTIAL_OVERRIDE_ENV, key_file.clone());
        }

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            http = http.connect_timeout(timeout);
        }
        let http = http
            .build()
            .map_err(|e| GcpError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            cli,
            auth,
            config,
            http,
        })
    }

    async fn run(&self, args: &[&str], resource: &str) -> Result<String> {
        self.cli.run(args).await.map_err(|e| classify(e, resource))
    }

    async fn access_token(&self) -> Result<String> {
        let token = self
            .auth
            .run_sensitive(&["auth", "print-access-token"])
            .await
            .map_err(|e| GcpError::AuthenticationFailed(e.to_string()))?;
        Ok(token.trim().to_string())
    }
}

#[async_trait]
impl GcpApi for Gcloud {
    async fn validate(&self) -> Result<()> {
        let zone = format!("--zones={}", self.config.zone);
        self.run(&["compute", "instances", "list", zone.as_str(), "--limit=1"], "instances")
            .await
            .map(|_| ())
    }

    async fn list_instances(&self) -> Result<Vec<GceInstance>> {
        let zone = format!("--zones={}", self.config.zone);
        let output = self
            .run(&["compute", "instances", "list", zone.as_str()], "instances")
            .await?;
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&output)?)
    }

    async fn get_instance(&self, name: &str) -> Result<GceInstance> {
        let zone = format!("--zone={}", self.config.zone);
        let output = self
            .run(&["compute", "instances", "describe", name, zone.as_str()], name)
            .await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn create_image(&self, image_name: &str, disk: &GceDisk) -> Result<()> {
        let source = format!("--source-disk={}", disk.name);
        let zone = format!("--source-disk-zone={}", disk.zone);
        self.run(&["compute", "images", "create", image_name, source.as_str(), zone.as_str()], &disk.name)
            .await?;
        tracing::info!(image = %image_name, disk = %disk.name, "Image created from disk");
        Ok(())
    }

    async fn export_image(
        &self,
        image_name: &str,
        destination_uri: &str,
        format: GcpFormat,
    ) -> Result<()> {
        let image = format!("--image={}", image_name);
        let destination = format!("--destination-uri={}", destination_uri);
        let mut args = vec!["compute", "images", "export", image.as_str(), destination.as_str()];
        // Without --export-format gcloud writes a gzipped raw tarball
        if format == GcpFormat::Vmdk {
            args.push("--export-format=vmdk");
        }
        self.run(&args, image_name).await?;
        tracing::info!(image = %image_name, uri = %destination_uri, "Image exported to GCS");
        Ok(())
    }

    async fn object_source(&self, bucket: &str, object: &str) -> Result<Box<dyn ByteSource>> {
        let token = self.access_token().await?;
        let url = object_media_url(bucket, object)?;
        Ok(Box::new(
            HttpSource::new(self.http.clone(), url)
                .with_bearer_token(token)
                .with_identity(format!("gs://{}/{}", bucket, object)),
        ))
    }

    async fn delete_object(&self, bucket: &str, object: &str) -> Result<()> {
        let uri = format!("gs://{}/{}", bucket, object);
        self.run(&["storage", "rm", uri.as_str()], &uri).await.map(|_| ())
    }
}
