//! Configuration loading and data folder resolution
//!
//! Bootstrap configuration comes from a single TOML file. Every section is
//! optional; missing keys fall back to built-in defaults and a missing file
//! is not fatal.
//!
//! Data folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`MBQ_DATA_FOLDER`)
//! 3. TOML config file (`data_folder`)
//! 4. OS-dependent compiled default (fallback)

use crate::events::DEFAULT_EVENT_CAPACITY;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable overriding the data folder
pub const DATA_FOLDER_ENV: &str = "MBQ_DATA_FOLDER";

/// File name of the persisted queue inside the data folder
pub const QUEUE_FILE_NAME: &str = "queue.json";

/// Directory name of the local media cache inside the data folder
pub const AUDIO_CACHE_DIR: &str = "audio_cache";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Folder holding the persisted queue and the media cache (optional)
    #[serde(default)]
    pub data_folder: Option<PathBuf>,

    /// Queue behaviour
    #[serde(default)]
    pub queue: QueueSettings,

    /// Per-contributor limits
    #[serde(default)]
    pub permissions: PermissionSettings,

    /// Logging configuration (optional)
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Queue behaviour settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSettings {
    /// Reorder the queue round-robin by contributor after every append
    #[serde(default)]
    pub round_robin_queue: bool,

    /// Write the queue to disk when entries are added
    #[serde(default = "default_true")]
    pub persistent_queue: bool,

    /// Capacity of the queue event bus
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            round_robin_queue: false,
            persistent_queue: true,
            event_bus_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Permission settings
///
/// Lengths are in seconds; `0` means unlimited.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionSettings {
    /// Maximum song length for contributors not listed in any group
    #[serde(default)]
    pub default_max_song_length: u64,

    /// Permission groups, checked in order; first match wins
    #[serde(default)]
    pub groups: Vec<PermissionGroupSettings>,
}

/// One permission group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGroupSettings {
    pub name: String,

    #[serde(default)]
    pub user_ids: Vec<u64>,

    #[serde(default)]
    pub max_song_length: u64,
}

impl PermissionGroupSettings {
    /// Maximum song length as a Duration, None when unlimited
    pub fn max_song_length(&self) -> Option<Duration> {
        seconds_limit(self.max_song_length)
    }
}

impl PermissionSettings {
    /// Default maximum song length as a Duration, None when unlimited
    pub fn default_max_song_length(&self) -> Option<Duration> {
        seconds_limit(self.default_max_song_length)
    }
}

fn seconds_limit(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded TOML configuration from {}", path.display());
        Ok(config)
    }

    /// Load configuration, degrading to defaults when the file is absent
    ///
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) => path,
                None => {
                    warn!("No config directory on this platform, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            warn!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }

        Self::load(&path)
    }
}

/// Default configuration file path for the platform (`<config dir>/mbq/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("mbq").join("config.toml"))
}

/// Resolve the data folder following the documented priority order
pub fn resolve_data_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(DATA_FOLDER_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Some(path) = &config.data_folder {
        return path.clone();
    }

    // Priority 4: OS-dependent compiled default
    default_data_folder()
}

/// OS-dependent default data folder
pub fn default_data_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("mbq"))
        .unwrap_or_else(|| PathBuf::from("./mbq_data"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_level() {
        assert_eq!(default_log_level(), "info");
    }

    #[test]
    fn test_queue_settings_defaults() {
        let settings = QueueSettings::default();
        assert!(!settings.round_robin_queue);
        assert!(settings.persistent_queue);
        assert_eq!(settings.event_bus_capacity, DEFAULT_EVENT_CAPACITY);
    }

    #[test]
    fn test_zero_length_is_unlimited() {
        let settings = PermissionSettings::default();
        assert_eq!(settings.default_max_song_length(), None);

        let group = PermissionGroupSettings {
            name: "Limited".to_string(),
            user_ids: vec![1],
            max_song_length: 90,
        };
        assert_eq!(group.max_song_length(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert!(config.data_folder.is_none());
        assert_eq!(config.queue, QueueSettings::default());
        assert_eq!(config.logging.level, "info");
    }
}
