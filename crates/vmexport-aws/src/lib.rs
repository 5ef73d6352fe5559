//! Amazon EC2 provider for vmexport
//!
//! Exports an instance through an EC2 instance export task: AWS writes the
//! image to S3, and the object is fetched via a presigned URL.
//!
//! # Requirements
//!
//! - `aws` CLI v2 installed
//! - Credentials from the environment, a named `profile`, or `access_key` /
//!   `secret_key` in the provider config
//! - An S3 bucket (`s3_bucket`) with the ACL grant the VM Import/Export
//!   service needs

pub mod api;
pub mod awscli;
pub mod error;
pub mod export;
pub mod options;
pub mod provider;

#[cfg(test)]
mod mock;

pub use api::{AwsApi, Ec2Instance, ExportTarget, ExportTask, ExportTaskState};
pub use awscli::AwsCli;
pub use error::{AwsError, Result};
pub use options::{AwsConfig, AwsExportOptions, AwsFormat};
pub use provider::AwsProvider;
