//! AWS CLI wrapper

use crate::api::{
    AwsApi, CallerIdentity, CreateExportTask, DescribeExportTasks, DescribeInstances, Ec2Instance,
    ExportTarget, ExportTask,
};
use crate::error::{AwsError, Result};
use crate::options::AwsConfig;
use async_trait::async_trait;
use vmexport_core::cli::{CliError, CliRunner};
use vmexport_core::{ByteSource, HttpSource};

/// Lifetime of presigned download URLs
const PRESIGN_EXPIRY_SECS: &str = "21600";

/// `aws` CLI backed implementation of [`AwsApi`]
pub struct AwsCli {
    cli: CliRunner,
    http: reqwest::Client,
}

const AUTH_MARKERS: &[&str] = &[
    "Unable to locate credentials",
    "InvalidClientTokenId",
    "AuthFailure",
    "ExpiredToken",
    "SignatureDoesNotMatch",
    "UnauthorizedOperation",
];

fn classify(err: CliError, resource: &str) -> AwsError {
    let stderr = err.stderr();
    if AUTH_MARKERS.iter().any(|m| stderr.contains(m)) {
        return AwsError::AuthenticationFailed(stderr.trim().to_string());
    }
    if stderr.contains("InvalidInstanceID") {
        return AwsError::InstanceNotFound(resource.to_string());
    }
    AwsError::Cli(err)
}

/// `--export-to-s3-task` shorthand value
fn s3_task_spec(target: &ExportTarget) -> String {
    format!(
        "DiskImageFormat={},S3Bucket={},S3Prefix={}",
        target.format.as_str().to_ascii_uppercase(),
        target.bucket,
        target.prefix
    )
}

impl AwsCli {
    pub fn new(config: &AwsConfig) -> Result<Self> {
        let mut cli = CliRunner::new("aws").with_global_args([
            "--output".to_string(),
            "json".to_string(),
            "--region".to_string(),
            config.region.clone(),
        ]);
        if let Some(profile) = &config.profile {
            cli = cli.with_global_args(["--profile".to_string(), profile.clone()]);
        }
        if let (Some(key), Some(secret)) = (&config.access_key, &config.secret_key) {
            cli = cli
                .with_env("AWS_ACCESS_KEY_ID", key.clone())
                .with_env("AWS_SECRET_ACCESS_KEY", secret.clone());
            if let Some(token) = &config.session_token {
                cli = cli.with_env("AWS_SESSION_TOKEN", token.clone());
            }
        }

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = config.timeout {
            http = http.connect_timeout(timeout);
        }
        let http = http
            .build()
            .map_err(|e| AwsError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self { cli, http })
    }

    async fn run(&self, args: &[&str], resource: &str) -> Result<String> {
        self.cli.run(args).await.map_err(|e| classify(e, resource))
    }
}

#[async_trait]
impl AwsApi for AwsCli {
    async fn caller_identity(&self) -> Result<CallerIdentity> {
        let output = self.run(&["sts", "get-caller-identity"], "identity").await?;
        Ok(serde_json::from_str(&output)?)
    }

    async fn list_instances(&self) -> Result<Vec<Ec2Instance>> {
        let output = self.run(&["ec2", "describe-instances"], "instances").await?;
        Ok(serde_json::from_str::<DescribeInstances>(&output)?.into_instances())
    }

    /// Accepts an instance ID or the value of its `Name` tag
    async fn get_instance(&self, identifier: &str) -> Result<Ec2Instance> {
        let output = if identifier.starts_with("i-") {
            self.run(&["ec2", "describe-instances", "--instance-ids", identifier], identifier)
                .await?
        } else {
            let filter = format!("Name=tag:Name,Values={}", identifier);
            self.run(&["ec2", "describe-instances", "--filters", filter.as_str()], identifier)
                .await?
        };
        serde_json::from_str::<DescribeInstances>(&output)?
            .into_instances()
            .into_iter()
            .next()
            .ok_or_else(|| AwsError::InstanceNotFound(identifier.to_string()))
    }

    async fn create_export_task(&self, instance_id: &str, target: &ExportTarget) -> Result<String> {
        let task_spec = s3_task_spec(target);
        let output = self
            .run(
                &[
                    "ec2",
                    "create-instance-export-task",
                    "--instance-id",
                    instance_id,
                    "--target-environment",
                    target.format.target_environment(),
                    "--export-to-s3-task",
                    task_spec.as_str(),
                ],
                instance_id,
            )
            .await?;
        let created: CreateExportTask = serde_json::from_str(&output)?;
        tracing::info!(instance = %instance_id, task_id = %created.export_task.export_task_id, "Export task created");
        Ok(created.export_task.export_task_id)
    }

    async fn describe_export_task(&self, task_id: &str) -> Result<ExportTask> {
        let output = self
            .run(&["ec2", "describe-export-tasks", "--export-task-ids", task_id], task_id)
            .await?;
        serde_json::from_str::<DescribeExportTasks>(&output)?
            .export_tasks
            .into_iter()
            .next()
            .ok_or_else(|| AwsError::ExportTask {
                task_id: task_id.to_string(),
                message: "task not found".to_string(),
            })
    }

    async fn cancel_export_task(&self, task_id: &str) -> Result<()> {
        self.run(&["ec2", "cancel-export-task", "--export-task-id", task_id], task_id)
            .await
            .map(|_| ())
    }

    async fn object_source(&self, bucket: &str, key: &str) -> Result<Box<dyn ByteSource>> {
        let uri = format!("s3://{}/{}", bucket, key);
        let url = self
            .cli
            .run_sensitive(&["s3", "presign", uri.as_str(), "--expires-in", PRESIGN_EXPIRY_SECS])
            .await
            .map_err(|e| classify(e, &uri))?;
        Ok(Box::new(
            HttpSource::new(self.http.clone(), url.trim()).with_identity(uri),
        ))
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let uri = format!("s3://{}/{}", bucket, key);
        self.run(&["s3", "rm", uri.as_str()], &uri).await.map(|_| ())
    }
}
