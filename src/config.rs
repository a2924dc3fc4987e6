//! Connection settings
//!
//! The API URL and token come from the command line, the environment
//! (both through clap) or `config.toml` in the config directory, in that
//! order.

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use crate::paths;

pub const CONFIG_FILE: &str = "config.toml";

static API_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://\S+$").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});
static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-f]{32}$").unwrap_or_else(|e| unreachable!("static regex: {e}"))
});

/// Contents of `config.toml`; every key is optional.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub api: Option<String>,
    pub token: Option<String>,
}

impl FileConfig {
    /// Load a config file. A missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid {}", path.display()))
    }
}

/// Validated connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api: String,
    pub token: String,
}

impl Settings {
    /// Resolve settings from CLI/env values, falling back to the config file.
    pub fn resolve(api: Option<String>, token: Option<String>) -> Result<Self> {
        let file = if api.is_none() || token.is_none() {
            FileConfig::load(&paths::config_dir()?.join(CONFIG_FILE))?
        } else {
            FileConfig::default()
        };
        Self::merge(api, token, file)
    }

    fn merge(api: Option<String>, token: Option<String>, file: FileConfig) -> Result<Self> {
        let api = api
            .or(file.api)
            .context("No API URL configured (use --api, ASSETCTL_API or config.toml)")?;
        let token = token
            .or(file.token)
            .context("No token configured (use --token, ASSETCTL_TOKEN or config.toml)")?;

        if !API_RE.is_match(&api) {
            bail!("Invalid API URL '{api}': expecting http:// or https://");
        }
        if !TOKEN_RE.is_match(&token) {
            bail!("Invalid token: expecting 32 lowercase hexadecimal characters");
        }
        Ok(Self { api, token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_cli_values_win() {
        let file = FileConfig {
            api: Some("https://file.example".into()),
            token: Some("f".repeat(32)),
        };
        let settings = Settings::merge(
            Some("https://cli.example".into()),
            Some(TOKEN.into()),
            file,
        )
        .unwrap();
        assert_eq!(settings.api, "https://cli.example");
        assert_eq!(settings.token, TOKEN);
    }

    #[test]
    fn test_file_fills_gaps() {
        let file = FileConfig {
            api: Some("https://file.example".into()),
            token: None,
        };
        let settings = Settings::merge(None, Some(TOKEN.into()), file).unwrap();
        assert_eq!(settings.api, "https://file.example");
    }

    #[test]
    fn test_validation() {
        let merge = |api: &str, token: &str| {
            Settings::merge(Some(api.into()), Some(token.into()), FileConfig::default())
        };
        assert!(merge("ftp://x", TOKEN).is_err());
        assert!(merge("https://x", "ABCDEF0123456789ABCDEF0123456789").is_err());
        assert!(merge("https://x", "abc").is_err());
        assert!(Settings::merge(None, Some(TOKEN.into()), FileConfig::default()).is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        assert!(FileConfig::load(&path).unwrap().api.is_none());

        fs::write(&path, format!("api = \"https://api.example\"\ntoken = \"{TOKEN}\"\n")).unwrap();
        let file = FileConfig::load(&path).unwrap();
        assert_eq!(file.api.as_deref(), Some("https://api.example"));
        assert_eq!(file.token.as_deref(), Some(TOKEN));

        fs::write(&path, "api = [").unwrap();
        assert!(FileConfig::load(&path).is_err());
    }
}
