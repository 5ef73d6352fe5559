//! vmexport configuration
//!
//! Locates and parses `vmexport.yaml`: named provider profiles, transfer
//! defaults and storage cost rates.

pub mod cost;
pub mod error;
pub mod profile;

pub use cost::{CostSettings, FlatRateEstimator, StorageRate};
pub use error::*;
pub use profile::{ProfileConfig, TransferDefaults, VmexportConfig};

use std::path::{Path, PathBuf};

/// Overrides config file discovery
pub const CONFIG_PATH_ENV: &str = "VMEXPORT_CONFIG_PATH";

const LOCAL_CANDIDATES: [&str; 2] = ["vmexport.yaml", ".vmexport.yaml"];
const GLOBAL_FILE: &str = "config.yaml";

/// `~/.config/vmexport` (platform equivalent elsewhere)
pub fn get_config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("vmexport"))
        .ok_or(ConfigError::ConfigDirNotFound)
}

/// Find the config file
///
/// Search order:
/// 1. `$VMEXPORT_CONFIG_PATH`
/// 2. current directory: `vmexport.yaml`, `.vmexport.yaml`
/// 3. `~/.config/vmexport/config.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    let current_dir = std::env::current_dir()?;
    let global_dir = get_config_dir().ok();
    find_config_file_from(&current_dir, global_dir.as_deref())
}

/// [`find_config_file`] relative to an explicit working and global directory
pub fn find_config_file_from(current_dir: &Path, global_dir: Option<&Path>) -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.is_file() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{} points to a missing file, searching defaults", CONFIG_PATH_ENV);
    }

    for filename in LOCAL_CANDIDATES {
        let path = current_dir.join(filename);
        if path.is_file() {
            return Ok(path);
        }
    }

    if let Some(dir) = global_dir {
        let path = dir.join(GLOBAL_FILE);
        if path.is_file() {
            return Ok(path);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Load the discovered config file; no file at all is not an error
pub fn load_config() -> Result<Option<(PathBuf, VmexportConfig)>> {
    match find_config_file() {
        Ok(path) => {
            let config = VmexportConfig::load(&path)?;
            Ok(Some((path, config)))
        }
        Err(ConfigError::ConfigFileNotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_find_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("vmexport.yaml"), "providers: {}").unwrap();

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            let found = find_config_file_from(temp_dir.path(), None).unwrap();
            assert_eq!(found, temp_dir.path().join("vmexport.yaml"));
        });
    }

    #[test]
    fn test_visible_file_wins_over_hidden() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join(".vmexport.yaml"), "providers: {}").unwrap();

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            let found = find_config_file_from(temp_dir.path(), None).unwrap();
            assert!(found.ends_with(".vmexport.yaml"));

            fs::write(temp_dir.path().join("vmexport.yaml"), "providers: {}").unwrap();
            let found = find_config_file_from(temp_dir.path(), None).unwrap();
            assert!(found.ends_with("vmexport.yaml"));
            assert!(!found.ends_with(".vmexport.yaml"));
        });
    }

    #[test]
    fn test_env_var_takes_priority() {
        let temp_dir = tempfile::tempdir().unwrap();
        let custom = temp_dir.path().join("custom.yaml");
        fs::write(&custom, "providers: {}").unwrap();
        fs::write(temp_dir.path().join("vmexport.yaml"), "providers: {}").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(&custom), || {
            assert_eq!(find_config_file_from(temp_dir.path(), None).unwrap(), custom);
        });

        // A dangling override falls through to the normal search
        temp_env::with_var(CONFIG_PATH_ENV, Some(temp_dir.path().join("gone.yaml")), || {
            let found = find_config_file_from(temp_dir.path(), None).unwrap();
            assert!(found.ends_with("vmexport.yaml"));
        });
    }

    #[test]
    fn test_global_fallback_and_not_found() {
        let cwd = tempfile::tempdir().unwrap();
        let global = tempfile::tempdir().unwrap();

        temp_env::with_var_unset(CONFIG_PATH_ENV, || {
            assert!(matches!(
                find_config_file_from(cwd.path(), Some(global.path())),
                Err(ConfigError::ConfigFileNotFound)
            ));

            fs::write(global.path().join("config.yaml"), "providers: {}").unwrap();
            let found = find_config_file_from(cwd.path(), Some(global.path())).unwrap();
            assert_eq!(found, global.path().join("config.yaml"));
        });
    }
}
