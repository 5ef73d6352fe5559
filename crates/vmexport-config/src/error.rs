use std::path::PathBuf;
use thiserror::Error;
use vmexport_core::ExportError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config directory not found")]
    ConfigDirNotFound,

    #[error(
        "Config file not found. Searched:\n\
        - $VMEXPORT_CONFIG_PATH\n\
        - current directory: vmexport.yaml, .vmexport.yaml\n\
        - ~/.config/vmexport/config.yaml"
    )]
    ConfigFileNotFound,

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Profile not found: {0}")]
    ProfileNotFound(String),

    #[error("Several profiles are defined; pick one with --profile or set default_profile")]
    NoDefaultProfile,

    #[error("Profile '{profile}': environment variable {var} is not set")]
    MissingSecret { profile: String, var: String },

    #[error("Profile '{profile}': {message}")]
    InvalidProfile { profile: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ConfigError> for ExportError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::Io(e) => ExportError::Io(e),
            other => ExportError::InvalidConfig(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
