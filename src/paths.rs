//! Centralized path resolution for drupid
//!
//! # Environment Variables
//!
//! - `DRUPID_CONFIG_DIR` - Override config directory
//! - `DRUPID_CACHE_DIR` - Override download cache directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `DRUPID_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/drupid` (if set)
//! 3. `~/.config/drupid`
//!
//! For cache_dir():
//! 1. `--cache-dir` flag
//! 2. `DRUPID_CACHE_DIR` environment variable
//! 3. `cache_dir` in the settings file
//! 4. Platform cache directory (`~/.cache/drupid`, `~/Library/Caches/drupid`)

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "DRUPID_CONFIG_DIR";

/// Environment variable for cache directory override
pub const ENV_CACHE_DIR: &str = "DRUPID_CACHE_DIR";

/// Get the drupid config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("drupid");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(".config").join("drupid");
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Path of the settings file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Resolve the download cache directory
pub fn cache_dir(flag: Option<&Path>, configured: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(expand(&dir.to_string_lossy()));
    }

    if let Ok(dir) = std::env::var(ENV_CACHE_DIR) {
        let path = expand(&dir);
        log::debug!("Using cache dir from {}: {}", ENV_CACHE_DIR, path.display());
        return Ok(path);
    }

    if let Some(dir) = configured {
        return Ok(expand(dir));
    }

    let cache = dirs::cache_dir().context("Could not determine cache directory")?;
    Ok(cache.join("drupid"))
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use std::env;

    /// Run `f` with `key` set to `value` (or removed when `None`).
    ///
    /// Each test touches its own variable, so concurrent tests never race on
    /// the same key.
    fn with_env_var<F, R>(key: &str, value: Option<&str>, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let original = env::var(key).ok();
        // SAFETY: no other test reads or writes this key
        match value {
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        let result = f();
        match original {
            // SAFETY: as above
            Some(v) => unsafe { env::set_var(key, v) },
            None => unsafe { env::remove_var(key) },
        }
        result
    }

    #[test]
    fn test_config_dir_env_override() {
        with_env_var(ENV_CONFIG_DIR, Some("/custom/config/path"), || {
            assert_eq!(config_dir().unwrap(), PathBuf::from("/custom/config/path"));
            assert_eq!(
                config_file().unwrap(),
                PathBuf::from("/custom/config/path/config.toml")
            );
        });
    }

    #[test]
    fn test_cache_dir_priority() {
        with_env_var(ENV_CACHE_DIR, Some("/env/cache"), || {
            assert_eq!(
                cache_dir(Some(Path::new("/flag/cache")), Some("/settings/cache")).unwrap(),
                PathBuf::from("/flag/cache")
            );
            assert_eq!(
                cache_dir(None, Some("/settings/cache")).unwrap(),
                PathBuf::from("/env/cache")
            );
        });
        with_env_var(ENV_CACHE_DIR, None, || {
            assert_eq!(
                cache_dir(None, Some("/settings/cache")).unwrap(),
                PathBuf::from("/settings/cache")
            );
            let default = cache_dir(None, None).unwrap();
            assert!(default.ends_with("drupid"));
        });
    }

    #[test]
    fn test_expand_with_tilde() {
        let result = expand("~/test/path");
        let home = dirs::home_dir().unwrap();
        assert_eq!(result, home.join("test").join("path"));
    }

    #[test]
    fn test_expand_unknown_env_var_unchanged() {
        let result = expand("/path/$NONEXISTENT_VAR_12345/file");
        assert_eq!(result, PathBuf::from("/path/$NONEXISTENT_VAR_12345/file"));
    }
}
