//! Azure provider error types

use thiserror::Error;
use vmexport_core::ExportError;
use vmexport_core::cli::CliError;

#[derive(Error, Debug)]
pub enum AzureError {
    #[error("Azure CLI error: {0}")]
    Cli(#[from] CliError),

    #[error("Azure authentication failed: {0}. Run `az login` or configure a service principal")]
    AuthenticationFailed(String),

    #[error("VM not found: {0}")]
    VmNotFound(String),

    #[error("Invalid Azure configuration: {0}")]
    InvalidConfig(String),

    #[error("Blob storage request failed ({status}): {message}")]
    Blob { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<AzureError> for ExportError {
    fn from(e: AzureError) -> Self {
        match e {
            AzureError::Cli(cli) => cli.into(),
            AzureError::AuthenticationFailed(msg) => ExportError::Authentication(msg),
            AzureError::VmNotFound(vm) => ExportError::VmNotFound(vm),
            AzureError::InvalidConfig(msg) => ExportError::InvalidConfig(msg),
            AzureError::Json(e) => ExportError::Json(e),
            other => ExportError::CommandFailed(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, AzureError>;
