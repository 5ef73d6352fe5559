//! AWS provider error types

use thiserror::Error;
use vmexport_core::ExportError;
use vmexport_core::cli::CliError;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("AWS CLI error: {0}")]
    Cli(#[from] CliError),

    #[error("AWS authentication failed: {0}. Configure credentials or a profile")]
    AuthenticationFailed(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Invalid AWS configuration: {0}")]
    InvalidConfig(String),

    #[error("Export task {task_id} failed: {message}")]
    ExportTask { task_id: String, message: String },

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AwsError> for ExportError {
    fn from(e: AwsError) -> Self {
        match e {
            AwsError::Cli(cli) => cli.into(),
            AwsError::AuthenticationFailed(msg) => ExportError::Authentication(msg),
            AwsError::InstanceNotFound(id) => ExportError::VmNotFound(id),
            AwsError::InvalidConfig(msg) => ExportError::InvalidConfig(msg),
            AwsError::Json(e) => ExportError::Json(e),
            other => ExportError::CommandFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AwsError>;
