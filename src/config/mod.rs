//! # Configuration Management Module
//!
//! Typed TOML configuration for the `fablekit` binary and for hosts embedding a
//! [`Session`](crate::session::Session).
//!
//! ## Sections
//!
//! - [`GameConfig`] - title shown by the CLI, optional autosave slot
//! - [`StorageConfig`] - save directory, slot backend, snapshot format, compression
//! - [`LoggingConfig`] - log level and optional log file
//!
//! ## Usage
//!
//! ```rust,no_run
//! use fablekit::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("fablekit.toml").await?;
//!     config.validate()?;
//!     println!("Saves live in {}", config.storage.save_dir);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [game]
//! title = "The Lighthouse"
//! autosave_slot = "autosave"
//!
//! [storage]
//! save_dir = "saves"
//! backend = "files"     # or "sled"
//! format = "bincode"    # or "json"
//! compress = true
//!
//! [logging]
//! level = "info"
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::storage::transform::{ByteTransform, Gzip, Identity};
use crate::storage::{SnapshotFormat, StorageBackend};
use crate::validation::validate_slot_name;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub title: String,
    /// Slot written when the player quits. `None` disables autosave.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autosave_slot: Option<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            title: "The Lighthouse".to_string(),
            autosave_slot: Some("autosave".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_save_dir")]
    pub save_dir: String,
    /// "files" or "sled"
    #[serde(default = "default_backend")]
    pub backend: String,
    /// "bincode" or "json"
    #[serde(default = "default_format")]
    pub format: String,
    /// Gzip stored snapshots.
    #[serde(default = "default_compress")]
    pub compress: bool,
}

fn default_save_dir() -> String {
    "saves".to_string()
}

fn default_backend() -> String {
    "files".to_string()
}

fn default_format() -> String {
    "bincode".to_string()
}

fn default_compress() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            backend: default_backend(),
            format: default_format(),
            compress: default_compress(),
        }
    }
}

impl StorageConfig {
    pub fn snapshot_format(&self) -> Result<SnapshotFormat> {
        self.format.parse().map_err(|e: String| anyhow!(e))
    }

    pub fn backend(&self) -> Result<StorageBackend> {
        self.backend.parse().map_err(|e: String| anyhow!(e))
    }

    pub fn transform(&self) -> Arc<dyn ByteTransform> {
        if self.compress {
            Arc::new(Gzip::default())
        } else {
            Arc::new(Identity)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path.display(), e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path.display(), e))?;

        Ok(config)
    }

    /// Write a default configuration file. Refuses to overwrite an existing one.
    pub async fn create_default<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        if fs::try_exists(path).await.unwrap_or(false) {
            return Err(anyhow!(
                "Config file {} already exists; not overwriting",
                path.display()
            ));
        }
        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path.display(), e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.save_dir.trim().is_empty() {
            return Err(anyhow!("storage.save_dir must not be empty"));
        }
        self.storage.snapshot_format()?;
        self.storage.backend()?;
        if let Some(slot) = &self.game.autosave_slot {
            validate_slot_name(slot)
                .map_err(|e| anyhow!("game.autosave_slot '{}': {}", slot, e))?;
        }
        match self.logging.level.to_ascii_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" | "off" => Ok(()),
            other => Err(anyhow!("logging.level '{}' is not a log level", other)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            game: GameConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn default_config_round_trips_and_is_not_overwritten() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fablekit.toml");
        Config::create_default(&path).await.unwrap();
        let loaded = Config::load(&path).await.unwrap();
        loaded.validate().unwrap();
        assert_eq!(loaded.storage.save_dir, "saves");
        assert_eq!(loaded.storage.snapshot_format().unwrap(), SnapshotFormat::Bincode);
        assert!(Config::create_default(&path).await.is_err());
    }

    #[test]
    fn partial_file_uses_section_defaults() {
        let config: Config = toml::from_str("[storage]\nformat = \"json\"\n").unwrap();
        assert_eq!(config.storage.save_dir, "saves");
        assert_eq!(config.storage.snapshot_format().unwrap(), SnapshotFormat::Json);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn validate_rejects_unknown_names() {
        let mut config = Config::default();
        config.storage.backend = "postgres".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.game.autosave_slot = Some(".bad".into());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.storage.compress = false;
        assert_eq!(config.storage.transform().name(), "identity");
    }
}
