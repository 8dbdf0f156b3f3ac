use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::paths;

/// User settings read from `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Download cache directory
    pub cache_dir: Option<String>,
    /// Path to the drush executable
    pub drush: Option<String>,
    /// Site used when `--site` is not given
    pub default_site: Option<String>,
    pub follow_dependencies: bool,
    pub sync_core: bool,
    pub sync_libraries: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache_dir: None,
            drush: None,
            default_site: None,
            follow_dependencies: true,
            sync_core: true,
            sync_libraries: true,
        }
    }
}

impl Settings {
    /// Load the settings file, falling back to defaults when it is missing
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_file()?)
    }

    /// Load settings from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid settings in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let tmp = TempDir::new().unwrap();
        let settings = Settings::load_from(&tmp.path().join("config.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.follow_dependencies);
    }

    #[test]
    fn test_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(
            &path,
            "cache_dir = \"~/drupid-cache\"\ndefault_site = \"example.com\"\nsync_libraries = false\n",
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.cache_dir.as_deref(), Some("~/drupid-cache"));
        assert_eq!(settings.default_site.as_deref(), Some("example.com"));
        assert!(!settings.sync_libraries);
        assert!(settings.sync_core);
    }

    #[test]
    fn test_invalid_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        fs::write(&path, "sync_core = \"maybe\"\n").unwrap();
        assert!(Settings::load_from(&path).is_err());
    }
}
