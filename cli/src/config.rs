//! CLI Configuration
//!
//! Handles loading and saving the session configuration from TOML files.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use cipherpulse_sync::{
    Address, Deployment, DeploymentRegistry, SessionConfig, LOCAL_CHAIN_ID, SEPOLIA_CHAIN_ID,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Address of the first contract deployed on a fresh hardhat node
const HARDHAT_DEFAULT_CONTRACT: Address = Address::new([
    0x5f, 0xbd, 0xb2, 0x31, 0x56, 0x78, 0xaf, 0xec, 0xb3, 0x67, 0xf0, 0x32, 0xd9, 0x3f, 0x64,
    0x2f, 0x64, 0x18, 0x0a, 0xa3,
]);

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Full CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Contract deployments by chain
    #[serde(default = "default_deployments")]
    pub deployments: Vec<Deployment>,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            deployments: default_deployments(),
            storage: StorageSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

impl CliConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the file if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match Self::load(path) {
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Deployment registry built from `[[deployments]]`
    pub fn registry(&self) -> DeploymentRegistry {
        DeploymentRegistry::from_deployments(self.deployments.iter().cloned())
    }

    /// Authorization database path; relative paths resolve against `data_dir`
    pub fn authorization_db(&self, data_dir: &Path) -> PathBuf {
        match &self.storage.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => data_dir.join(path),
            None => data_dir.join("authorizations.redb"),
        }
    }

    /// Validate configuration
    fn validate(&self) -> Result<(), ConfigError> {
        if self.session.authorization_duration_days == 0 {
            return Err(ConfigError::Invalid(
                "authorization_duration_days must be at least 1".to_string(),
            ));
        }

        let mut chains = BTreeSet::new();
        for deployment in &self.deployments {
            if !chains.insert(deployment.chain_id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate deployment for chain {}",
                    deployment.chain_id
                )));
            }
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Invalid(format!(
                "unknown log format '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }
}

/// Local hardhat node deployed, sepolia not yet configured
fn default_deployments() -> Vec<Deployment> {
    vec![
        Deployment::new(LOCAL_CHAIN_ID, "hardhat", HARDHAT_DEFAULT_CONTRACT),
        Deployment::new(SEPOLIA_CHAIN_ID, "sepolia", Address::ZERO),
    ]
}

/// Storage settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Authorization database; `authorizations.redb` in the data directory if unset
    pub path: Option<PathBuf>,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level
    pub level: String,

    /// Output format (text, json)
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Get default data directory
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("io", "cipherpulse", "cipherpulse")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".cipherpulse"))
}

/// Get default config file path
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert_eq!(config.session.authorization_duration_days, 365);
        assert!(config.session.refresh_after_submit);
        assert_eq!(config.logging.format, "text");

        let registry = config.registry();
        assert_eq!(
            registry.resolve(Some(LOCAL_CHAIN_ID)).unwrap().address,
            HARDHAT_DEFAULT_CONTRACT
        );
        assert!(registry.resolve(Some(SEPOLIA_CHAIN_ID)).is_none());
    }

    #[test]
    fn test_save_load_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CliConfig::default();
        config.session.authorization_duration_days = 30;
        config.storage.path = Some(PathBuf::from("auth.redb"));
        config.save(&path).unwrap();

        let loaded = CliConfig::load(&path).unwrap();
        assert_eq!(loaded.session.authorization_duration_days, 30);
        assert_eq!(loaded.deployments, config.deployments);
        assert_eq!(
            loaded.authorization_db(dir.path()),
            dir.path().join("auth.redb")
        );
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[logging]\nlevel = \"debug\"\nformat = \"json\"\n").unwrap();

        let loaded = CliConfig::load(&path).unwrap();
        assert_eq!(loaded.logging.level, "debug");
        assert_eq!(loaded.deployments.len(), 2);
        assert_eq!(
            loaded.authorization_db(dir.path()),
            dir.path().join("authorizations.redb")
        );
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let config = CliConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.deployments.len(), 2);
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = CliConfig::default();
        config.session.authorization_duration_days = 0;
        assert!(config.validate().is_err());

        let mut config = CliConfig::default();
        config
            .deployments
            .push(Deployment::new(LOCAL_CHAIN_ID, "dup", Address::ZERO));
        assert!(config.validate().is_err());

        let mut config = CliConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
