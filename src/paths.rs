//! Centralized path resolution for assetctl
//!
//! # Environment Variables
//!
//! - `ASSETCTL_CONFIG_DIR` - Override config directory
//! - `ASSETCTL_CACHE_DIR` - Override cache directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `ASSETCTL_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/assetctl` (if set)
//! 3. `~/.config/assetctl`
//!
//! For cache_dir():
//! 1. `ASSETCTL_CACHE_DIR` environment variable
//! 2. `XDG_CACHE_HOME/assetctl` (if set)
//! 3. `~/.cache/assetctl`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "ASSETCTL_CONFIG_DIR";

/// Environment variable for cache directory override
pub const ENV_CACHE_DIR: &str = "ASSETCTL_CACHE_DIR";

const APP_DIR: &str = "assetctl";

/// Get the assetctl config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve(ENV_CONFIG_DIR, "XDG_CONFIG_HOME", ".config")
}

/// Get the directory holding cached container states
pub fn cache_dir() -> Result<PathBuf> {
    resolve(ENV_CACHE_DIR, "XDG_CACHE_HOME", ".cache")
}

fn resolve(override_var: &str, xdg_var: &str, home_subdir: &str) -> Result<PathBuf> {
    // 1. Check environment variable override
    if let Ok(dir) = std::env::var(override_var) {
        let path = expand(&dir);
        log::debug!("Using dir from {}: {}", override_var, path.display());
        return Ok(path);
    }

    // 2. Check XDG variable
    if let Ok(xdg) = std::env::var(xdg_var) {
        let path = PathBuf::from(xdg).join(APP_DIR);
        log::debug!("Using {}: {}", xdg_var, path.display());
        return Ok(path);
    }

    // 3. Home default
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home.join(home_subdir).join(APP_DIR);
    log::debug!("Using default dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
