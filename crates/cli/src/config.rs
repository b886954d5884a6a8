//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_ARTIFACT_PATH: &str = "models/dropout_model.json";
pub const DEFAULT_TARGET: &str = "is_active";

/// Defaults read from `~/.config/riskctl/config.json`; flags and env win
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub artifact_path: Option<PathBuf>,
    pub backup_path: Option<PathBuf>,
    pub target_column: Option<String>,
}

impl Config {
    /// Load the user config, or defaults when there is none
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {:?}", path))
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("riskctl").join("config.json"))
    }

    pub fn artifact_path(&self, flag: Option<PathBuf>) -> PathBuf {
        flag.or_else(|| self.artifact_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_ARTIFACT_PATH))
    }

    pub fn backup_path(&self, flag: Option<PathBuf>) -> Option<PathBuf> {
        flag.or_else(|| self.backup_path.clone())
    }

    pub fn target_column(&self, flag: Option<String>) -> String {
        flag.or_else(|| self.target_column.clone())
            .unwrap_or_else(|| DEFAULT_TARGET.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file_then_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"artifact_path": "/srv/model.json"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.artifact_path(None), PathBuf::from("/srv/model.json"));
        assert_eq!(
            config.artifact_path(Some(PathBuf::from("local.json"))),
            PathBuf::from("local.json")
        );
        assert_eq!(config.target_column(None), DEFAULT_TARGET);
        assert_eq!(config.backup_path(None), None);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.artifact_path(None), PathBuf::from(DEFAULT_ARTIFACT_PATH));
    }
}
