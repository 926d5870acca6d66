//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/notecache/config.toml)
//! 3. Environment variables (NOTECACHE_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::DEFAULT_TRASH_RETENTION_DAYS;
use crate::sync::{SyncConfig, DEFAULT_DEBOUNCE};

/// Environment variable prefix
const ENV_PREFIX: &str = "NOTECACHE";

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Directory holding the SQLite databases
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Quiet period before changes are written, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Days soft-deleted records stay in the trash listing
    #[serde(default = "default_trash_retention_days")]
    pub trash_retention_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            debounce_ms: default_debounce_ms(),
            trash_retention_days: default_trash_retention_days(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (NOTECACHE_DATA_DIR, NOTECACHE_DEBOUNCE_MS,
    ///    NOTECACHE_TRASH_RETENTION_DAYS)
    /// 2. Config file (~/.config/notecache/config.toml or NOTECACHE_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// Unparseable numbers are ignored with a warning.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_DEBOUNCE_MS", ENV_PREFIX)) {
            match val.trim().parse() {
                Ok(ms) => self.debounce_ms = ms,
                Err(_) => tracing::warn!("Ignoring invalid {}_DEBOUNCE_MS '{}'", ENV_PREFIX, val),
            }
        }

        if let Ok(val) = std::env::var(format!("{}_TRASH_RETENTION_DAYS", ENV_PREFIX)) {
            match val.trim().parse() {
                Ok(days) => self.trash_retention_days = days,
                Err(_) => tracing::warn!(
                    "Ignoring invalid {}_TRASH_RETENTION_DAYS '{}'",
                    ENV_PREFIX,
                    val
                ),
            }
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with NOTECACHE_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("notecache")
            .join("config.toml")
    }

    /// Get the path to the main notes database
    pub fn notes_db_path(&self) -> PathBuf {
        self.data_dir.join("notes.db")
    }

    /// Get the path to a user's notes database
    ///
    /// Characters other than ASCII letters, digits, `-`, `_` and `.` are
    /// replaced so a username can never escape the users directory.
    pub fn user_db_path(&self, username: &str) -> PathBuf {
        self.data_dir
            .join("users")
            .join(format!("{}.db", sanitize_username(username)))
    }

    /// Sync engine settings derived from this configuration
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }
}

fn sanitize_username(username: &str) -> String {
    let sanitized: String = username
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();

    // Dots alone would name the directory itself or its parent
    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        format!("_{}", sanitized)
    } else {
        sanitized
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("notecache")
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE.as_millis() as u64
}

fn default_trash_retention_days() -> i64 {
    DEFAULT_TRASH_RETENTION_DAYS
}
