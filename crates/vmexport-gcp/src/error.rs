//! GCP provider error types

use thiserror::Error;
use vmexport_core::ExportError;
use vmexport_core::cli::CliError;

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("gcloud error: {0}")]
    Cli(#[from] CliError),

    #[error("GCP authentication failed: {0}. Run `gcloud auth login` or set credentials_json")]
    AuthenticationFailed(String),

    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Invalid GCP configuration: {0}")]
    InvalidConfig(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<GcpError> for ExportError {
    fn from(e: GcpError) -> Self {
        match e {
            GcpError::Cli(cli) => cli.into(),
            GcpError::AuthenticationFailed(msg) => ExportError::Authentication(msg),
            GcpError::InstanceNotFound(name) => ExportError::VmNotFound(name),
            GcpError::InvalidConfig(msg) => ExportError::InvalidConfig(msg),
            GcpError::Json(e) => ExportError::Json(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, GcpError>;
