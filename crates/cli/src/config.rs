//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// Gateway URL
    pub api_url: Option<String>,
    /// Default output format
    pub default_format: Option<String>,
}

impl Config {
    /// Load configuration from the user's config directory
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from `path`; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    /// `<config dir>/trctl/config.json`
    fn config_path() -> Option<PathBuf> {
        dirs_next::config_dir().map(|dir| dir.join("trctl").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api_url": "http://gateway:5001", "default_format": "json"}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_url.as_deref(), Some("http://gateway:5001"));
        assert_eq!(config.default_format.as_deref(), Some("json"));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "api_url = 1").unwrap();

        assert!(Config::load_from(&path).is_err());
    }
}
