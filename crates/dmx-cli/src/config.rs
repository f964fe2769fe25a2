use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use dmx_core::CoreConfig;

/// `dmx.toml`:
///
/// ```toml
/// store_path = "data/dmx.snapshot"
///
/// [core]
/// max_child_depth = 8
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub store_path: PathBuf,
    pub core: CoreConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("dmx.snapshot"),
            core: CoreConfig::default(),
        }
    }
}

impl CliConfig {
    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        toml::from_str(s).context("invalid config")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("in {}", path.display()))
    }

    /// The config file if one was given, defaults otherwise; `store`
    /// overrides the snapshot path either way.
    pub fn resolve(config: Option<&Path>, store: Option<&Path>) -> anyhow::Result<Self> {
        let mut resolved = match config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        if let Some(store) = store {
            resolved.store_path = store.to_path_buf();
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_defaults() {
        assert_eq!(CliConfig::from_toml_str("").unwrap(), CliConfig::default());
    }

    #[test]
    fn core_section_is_nested() {
        let c = CliConfig::from_toml_str(
            "store_path = \"data/x.snapshot\"\n[core]\nmax_child_depth = 8\n",
        )
        .unwrap();
        assert_eq!(c.store_path, PathBuf::from("data/x.snapshot"));
        assert_eq!(c.core.max_child_depth, 8);
        assert!(c.core.bootstrap);
    }

    #[test]
    fn store_flag_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dmx.toml");
        std::fs::write(&path, "store_path = \"a.snapshot\"\n").unwrap();

        let c = CliConfig::resolve(Some(&path), None).unwrap();
        assert_eq!(c.store_path, PathBuf::from("a.snapshot"));
        let c = CliConfig::resolve(Some(&path), Some(Path::new("b.snapshot"))).unwrap();
        assert_eq!(c.store_path, PathBuf::from("b.snapshot"));
    }

    #[test]
    fn missing_config_file_is_an_error() {
        assert!(CliConfig::resolve(Some(Path::new("/nonexistent/dmx.toml")), None).is_err());
    }
}
