//! Azure CLI wrapper
//!
//! Management operations go through `az`; blob copies use the Blob REST API
//! directly since `az storage blob copy` needs account keys.

use crate::api::{AccountInfo, AzVm, AzureApi, BlobCopyState};
use crate::error::{AzureError, Result};
use crate::options::AzureConfig;
use async_trait::async_trait;
use std::time::Duration;
use vmexport_core::cli::{CliError, CliRunner};
use vmexport_core::{ByteSource, HttpSource};

const BLOB_API_VERSION: &str = "2021-08-06";

/// `az` CLI backed implementation of [`AzureApi`]
pub struct AzCli {
    cli: CliRunner,
    config: AzureConfig,
    http: reqwest::Client,
}

/// Map stderr patterns to typed errors
fn classify(err: CliError, resource: &str) -> AzureError {
    let stderr = err.stderr();
    if stderr.contains("az login") || stderr.contains("AADSTS") || stderr.contains("InvalidAuthenticationToken") {
        return AzureError::AuthenticationFailed(stderr.lines().next().unwrap_or_default().to_string());
    }
    if stderr.contains("ResourceNotFound") || stderr.contains("was not found") {
        return AzureError::VmNotFound(resource.to_string());
    }
    AzureError::Cli(err)
}

/// Insert `blob_name` into a container URL, keeping its SAS query
pub fn blob_url(container_url: &str, blob_name: &str) -> String {
    let (base, query) = match container_url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (container_url, None),
    };
    let mut url = format!("{}/{}", base.trim_end_matches('/'), blob_name);
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    url
}

/// URL without its query string, safe to log and persist
pub fn strip_sas(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

impl AzCli {
    pub fn new(config: AzureConfig) -> Result<Self> {
        let mut cli = CliRunner::new("az").with_global_args(["--output", "json", "--only-show-errors"]);
        if let Some(subscription) = &config.subscription_id {
            cli = cli.with_global_args(["--subscription".to_string(), subscription.clone()]);
        }

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            http = http.connect_timeout(timeout);
        }

        Ok(Self {
            cli,
            config,
            http: http.build()?,
        })
    }

    async fn run(&self, args: &[&str], resource: &str) -> Result<String> {
        self.cli.run(args).await.map_err(|e| classify(e, resource))
    }

    fn resource_group(&self) -> Result<&str> {
        self.config
            .resource_group
            .as_deref()
            .ok_or_else(|| AzureError::InvalidConfig("resource_group is required".into()))
    }

    /// `--ids <id>` when we have a resource ID, else `-g <rg> -n <name>`
    fn vm_selector<'a>(&'a self, vm: &'a AzVm) -> Vec<&'a str> {
        if vm.id.is_empty() {
            vec![
                "--resource-group",
                self.config.resource_group.as_deref().unwrap_or(vm.resource_group()),
                "--name",
                vm.name.as_str(),
            ]
        } else {
            vec!["--ids", vm.id.as_str()]
        }
    }

    async fn vm_command(&self, verb: &str, vm: &AzVm) -> Result<String> {
        let mut args = vec!["vm", verb];
        args.extend(self.vm_selector(vm));
        self.run(&args, &vm.name).await
    }
}

#[async_trait]
impl AzureApi for AzCli {
    async fn login(&self) -> Result<()> {
        let (Some(client_id), Some(secret), Some(tenant)) = (
            self.config.client_id.as_deref(),
            self.config.client_secret.as_deref(),
            self.config.tenant_id.as_deref(),
        ) else {
            // Rely on an existing `az login` session
            return Ok(());
        };

        // `az login` rejects --subscription, so it gets its own runner
        CliRunner::new("az")
            .with_global_args(["--output", "none"])
            .run_sensitive(&[
                "login",
                "--service-principal",
                "--username",
                client_id,
                "--password",
                secret,
                "--tenant",
                tenant,
            ])
            .await
            .map_err(|e| AzureError::AuthenticationFailed(e.to_string()))?;
        tracing::info!(client_id = %client_id, "Logged in to Azure with service principal");
        Ok(())
    }

    async fn account(&self) -> Result<AccountInfo> {
        let output = self.run(&["account", "show"], "account").await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn list_vms(&self) -> Result<Vec<AzVm>> {
        let mut args = vec!["vm", "list", "--show-details"];
        if let Some(rg) = self.config.resource_group.as_deref() {
            args.extend(["--resource-group", rg]);
        }
        let output = self.run(&args, "vm list").await?;
        if output.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&output)?)
    }

    async fn get_vm(&self, identifier: &str) -> Result<AzVm> {
        let output = if identifier.starts_with("/subscriptions/") {
            self.run(&["vm", "show", "--show-details", "--ids", identifier], identifier)
                .await?
        } else {
            let rg = self.resource_group()?;
            self.run(
                &["vm", "show", "--show-details", "--resource-group", rg, "--name", identifier],
                identifier,
            )
            .await?
        };
        if output.trim().is_empty() {
            return Err(AzureError::VmNotFound(identifier.to_string()));
        }
        Ok(serde_json::from_str(&output)?)
    }

    async fn deallocate_vm(&self, vm: &AzVm) -> Result<()> {
        self.vm_command("deallocate", vm).await.map(|_| ())
    }

    async fn generalize_vm(&self, vm: &AzVm) -> Result<()> {
        self.vm_command("generalize", vm).await.map(|_| ())
    }

    async fn create_image(&self, vm: &AzVm, image_name: &str) -> Result<String> {
        let rg = self
            .config
            .resource_group
            .as_deref()
            .unwrap_or(vm.resource_group());
        let output = self
            .run(
                &[
                    "image",
                    "create",
                    "--resource-group",
                    rg,
                    "--name",
                    image_name,
                    "--source",
                    vm.id.as_str(),
                    "--location",
                    self.config.location.as_str(),
                ],
                image_name,
            )
            .await?;
        let image: serde_json::Value = serde_json::from_str(&output)?;
        Ok(image["id"].as_str().unwrap_or(image_name).to_string())
    }

    async fn grant_disk_access(&self, disk_id: &str, duration: Duration) -> Result<String> {
        let secs = duration.as_secs().to_string();
        let output = self
            .run(
                &[
                    "disk",
                    "grant-access",
                    "--ids",
                    disk_id,
                    "--access-level",
                    "Read",
                    "--duration-in-seconds",
                    secs.as_str(),
                ],
                disk_id,
            )
            .await?;
        let grant: serde_json::Value = serde_json::from_str(&output)?;
        grant
            .get("accessSas")
            .or_else(|| grant.get("accessSAS"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| AzureError::Blob {
                status: 0,
                message: format!("grant-access for {} returned no SAS URL", disk_id),
            })
    }

    async fn revoke_disk_access(&self, disk_id: &str) -> Result<()> {
        self.run(&["disk", "revoke-access", "--ids", disk_id], disk_id)
            .await
            .map(|_| ())
    }

    async fn start_blob_copy(&self, source_url: &str, blob_url: &str) -> Result<()> {
        let response = self
            .http
            .put(blob_url)
            .header("x-ms-version", BLOB_API_VERSION)
            .header("x-ms-copy-source", source_url)
            .header("Content-Length", "0")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AzureError::Blob {
                status: response.status().as_u16(),
                message: format!("copy to {} rejected", strip_sas(blob_url)),
            });
        }
        tracing::info!(blob = %strip_sas(blob_url), "Blob copy started");
        Ok(())
    }

    async fn blob_copy_status(&self, blob_url: &str) -> Result<BlobCopyState> {
        let response = self
            .http
            .head(blob_url)
            .header("x-ms-version", BLOB_API_VERSION)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AzureError::Blob {
                status: response.status().as_u16(),
                message: format!("status of {} unavailable", strip_sas(blob_url)),
            });
        }
        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let status = header("x-ms-copy-status").unwrap_or_default();
        Ok(match status.as_str() {
            "success" => BlobCopyState::Success,
            "pending" => BlobCopyState::Pending {
                progress: header("x-ms-copy-progress"),
            },
            other => BlobCopyState::Failed(
                header("x-ms-copy-status-description").unwrap_or_else(|| other.to_string()),
            ),
        })
    }

    fn disk_source(&self, disk_id: &str, sas_url: &str) -> Box<dyn ByteSource> {
        Box::new(
            HttpSource::new(self.http.clone(), sas_url).with_identity(format!("azure-disk:{}", disk_id)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_url_keeps_sas() {
        assert_eq!(
            blob_url("https://acct.blob.core.windows.net/vhds?sv=1&sig=abc", "os-1.vhd"),
            "https://acct.blob.core.windows.net/vhds/os-1.vhd?sv=1&sig=abc"
        );
        assert_eq!(
            blob_url("https://acct.blob.core.windows.net/vhds/", "os-1.vhd"),
            "https://acct.blob.core.windows.net/vhds/os-1.vhd"
        );
        assert_eq!(
            strip_sas("https://acct.blob.core.windows.net/vhds/os-1.vhd?sv=1&sig=abc"),
            "https://acct.blob.core.windows.net/vhds/os-1.vhd"
        );
    }

    #[test]
    fn test_classify_auth_and_not_found() {
        let auth = CliError::Failed {
            program: "az".into(),
            command: "vm show".into(),
            stderr: "ERROR: Please run 'az login' to setup account.".into(),
        };
        assert!(matches!(classify(auth, "web"), AzureError::AuthenticationFailed(_)));

        let missing = CliError::Failed {
            program: "az".into(),
            command: "vm show".into(),
            stderr: "(ResourceNotFound) The Resource 'web' was not found.".into(),
        };
        assert!(matches!(classify(missing, "web"), AzureError::VmNotFound(vm) if vm == "web"));
    }
}
