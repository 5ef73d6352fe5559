//! EC2 and S3 operations used by the exporter, and the shapes the AWS CLI
//! returns for them

use crate::error::Result;
use crate::options::AwsFormat;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use vmexport_core::ByteSource;

#[async_trait]
pub trait AwsApi: Send + Sync {
    async fn caller_identity(&self) -> Result<CallerIdentity>;

    async fn list_instances(&self) -> Result<Vec<Ec2Instance>>;

    async fn get_instance(&self, instance_id: &str) -> Result<Ec2Instance>;

    /// Start an instance export task, returning its ID
    async fn create_export_task(&self, instance_id: &str, target: &ExportTarget) -> Result<String>;

    async fn describe_export_task(&self, task_id: &str) -> Result<ExportTask>;

    async fn cancel_export_task(&self, task_id: &str) -> Result<()>;

    /// Byte source reading an S3 object
    async fn object_source(&self, bucket: &str, key: &str) -> Result<Box<dyn ByteSource>>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;
}

/// Where an export task writes its image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportTarget {
    pub bucket: String,
    pub prefix: String,
    pub format: AwsFormat,
}

/// `aws sts get-caller-identity`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallerIdentity {
    pub account: String,
    #[serde(default)]
    pub arn: String,
    #[serde(default)]
    pub user_id: String,
}

/// `aws ec2 describe-instances`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeInstances {
    #[serde(default)]
    pub reservations: Vec<Reservation>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Reservation {
    #[serde(default)]
    pub instances: Vec<Ec2Instance>,
}

impl DescribeInstances {
    pub fn into_instances(self) -> Vec<Ec2Instance> {
        self.reservations
            .into_iter()
            .flat_map(|r| r.instances)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Ec2Instance {
    pub instance_id: String,
    #[serde(default)]
    pub instance_type: String,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub state: Option<InstanceState>,
    #[serde(default)]
    pub placement: Option<Placement>,
    #[serde(default)]
    pub private_ip_address: Option<String>,
    #[serde(default)]
    pub public_ip_address: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub platform_details: Option<String>,
    #[serde(default)]
    pub launch_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cpu_options: Option<CpuOptions>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub block_device_mappings: Vec<BlockDeviceMapping>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InstanceState {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Placement {
    #[serde(default)]
    pub availability_zone: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CpuOptions {
    #[serde(default)]
    pub core_count: u32,
    #[serde(default = "one")]
    pub threads_per_core: u32,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Tag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BlockDeviceMapping {
    #[serde(default)]
    pub device_name: String,
    #[serde(default)]
    pub ebs: Option<EbsDevice>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EbsDevice {
    pub volume_id: String,
}

impl Ec2Instance {
    /// `Name` tag, falling back to the instance ID
    pub fn name(&self) -> &str {
        self.tags
            .iter()
            .find(|t| t.key == "Name" && !t.value.is_empty())
            .map(|t| t.value.as_str())
            .unwrap_or(&self.instance_id)
    }

    pub fn state_name(&self) -> &str {
        self.state.as_ref().map(|s| s.name.as_str()).unwrap_or_default()
    }

    pub fn availability_zone(&self) -> &str {
        self.placement
            .as_ref()
            .map(|p| p.availability_zone.as_str())
            .unwrap_or_default()
    }

    /// Platform as reported by EC2; Linux instances leave `Platform` unset
    pub fn os(&self) -> &str {
        self.platform_details
            .as_deref()
            .or(self.platform.as_deref())
            .unwrap_or("linux")
    }

    pub fn vcpus(&self) -> u32 {
        self.cpu_options
            .as_ref()
            .map(|c| c.core_count * c.threads_per_core)
            .unwrap_or(0)
    }

    pub fn tag_map(&self) -> HashMap<String, String> {
        self.tags
            .iter()
            .map(|t| (t.key.clone(), t.value.clone()))
            .collect()
    }

    pub fn ip_addresses(&self) -> Vec<String> {
        [
            self.private_ip_address.as_deref(),
            self.public_ip_address.as_deref(),
        ]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect()
    }

    /// EBS volume IDs in block device order
    pub fn volume_ids(&self) -> Vec<String> {
        self.block_device_mappings
            .iter()
            .filter_map(|m| m.ebs.as_ref().map(|e| e.volume_id.clone()))
            .collect()
    }
}

/// `aws ec2 describe-export-tasks`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DescribeExportTasks {
    #[serde(default)]
    pub export_tasks: Vec<ExportTask>,
}

/// `aws ec2 create-instance-export-task`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateExportTask {
    pub export_task: ExportTask,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportTask {
    pub export_task_id: String,
    pub state: ExportTaskState,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default, rename = "ExportToS3Task")]
    pub export_to_s3_task: Option<ExportToS3Task>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportTaskState {
    Active,
    Cancelling,
    Cancelled,
    Completed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExportToS3Task {
    #[serde(default)]
    pub s3_bucket: Option<String>,
    #[serde(default)]
    pub s3_key: Option<String>,
}

impl ExportTask {
    pub fn s3_key(&self) -> Option<&str> {
        self.export_to_s3_task.as_ref().and_then(|t| t.s3_key.as_deref())
    }
}
