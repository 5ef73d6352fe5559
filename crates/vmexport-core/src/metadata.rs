//! Open key-value bags used at the provider boundary
//!
//! Providers project these into typed structs as soon as they receive them;
//! nothing past `connect` / option validation reads the raw map.

use crate::error::{ExportError, Result};
use std::collections::HashMap;
use std::time::Duration;

pub type Metadata = HashMap<String, serde_json::Value>;

/// Typed accessors for [`Metadata`]
pub trait MetadataExt {
    /// Deserialize the value under `key` into `T`
    fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>>;

    fn get_str(&self, key: &str) -> Option<&str>;

    fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_str(key)
            .filter(|s| !s.is_empty())
            .unwrap_or(default)
            .to_string()
    }

    fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        Ok(self.get_as::<bool>(key)?.unwrap_or(default))
    }

    fn get_u64_or(&self, key: &str, default: u64) -> Result<u64> {
        Ok(self.get_as::<u64>(key)?.unwrap_or(default))
    }

    /// Durations are stored as whole seconds
    fn get_secs_or(&self, key: &str, default: Duration) -> Result<Duration> {
        Ok(self
            .get_as::<u64>(key)?
            .map(Duration::from_secs)
            .unwrap_or(default))
    }
}

impl MetadataExt for Metadata {
    fn get_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                ExportError::InvalidOptions(format!("metadata key '{}': {}", key, e))
            }),
        }
    }

    fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_access() {
        let mut meta = Metadata::new();
        meta.insert("container_url".into(), json!("https://acct.blob.core.windows.net/c"));
        meta.insert("bandwidth_limit".into(), json!(1048576));
        meta.insert("copy_to_blob".into(), json!(true));
        meta.insert("access_duration_secs".into(), json!(7200));

        assert_eq!(
            meta.get_str("container_url"),
            Some("https://acct.blob.core.windows.net/c")
        );
        assert_eq!(meta.get_u64_or("bandwidth_limit", 0).unwrap(), 1048576);
        assert!(meta.get_bool_or("copy_to_blob", false).unwrap());
        assert_eq!(
            meta.get_secs_or("access_duration_secs", Duration::from_secs(1)).unwrap(),
            Duration::from_secs(7200)
        );
        assert_eq!(meta.get_string_or("missing", "vhd"), "vhd");
    }

    #[test]
    fn test_wrong_type_is_invalid_options() {
        let mut meta = Metadata::new();
        meta.insert("bandwidth_limit".into(), json!("fast"));
        let err = meta.get_u64_or("bandwidth_limit", 0).unwrap_err();
        assert!(matches!(err, ExportError::InvalidOptions(_)));
    }
}
