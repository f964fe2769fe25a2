use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Tunables of a [`CoreService`](crate::CoreService).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Create the core meta topics (data types, cardinalities, role types,
    /// core association types) when the service starts.
    pub bootstrap: bool,
    /// How often a schema load that failed with a transient error is retried.
    pub schema_cache_retries: u32,
    /// Depth bound for child topic materialization.
    pub max_child_depth: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            bootstrap: true,
            schema_cache_retries: 3,
            max_child_depth: 32,
        }
    }
}

impl CoreConfig {
    /// Parse a TOML document. Missing fields keep their defaults.
    pub fn from_toml_str(s: &str) -> CoreResult<Self> {
        toml::from_str(s).map_err(|e| CoreError::Config(e.to_string()))
    }

    /// Read and parse a TOML file.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = CoreConfig::default();
        assert!(c.bootstrap);
        assert_eq!(c.schema_cache_retries, 3);
        assert_eq!(c.max_child_depth, 32);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = CoreConfig::from_toml_str("max_child_depth = 4\n").unwrap();
        assert_eq!(c.max_child_depth, 4);
        assert!(c.bootstrap);
    }

    #[test]
    fn bad_toml_is_config_error() {
        let err = CoreConfig::from_toml_str("bootstrap = \"yes\"").unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.toml");
        let original = CoreConfig {
            bootstrap: false,
            schema_cache_retries: 1,
            max_child_depth: 8,
        };
        std::fs::write(&path, original.to_toml_string().unwrap()).unwrap();
        assert_eq!(CoreConfig::load(&path).unwrap(), original);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = CoreConfig::load(Path::new("/nonexistent/core.toml")).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
