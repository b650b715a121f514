//! Configuration management for the Tactus audio player
//!
//! TOML bootstrap configuration only: settings that cannot change while
//! running. Missing files and missing fields fall back to built-in
//! defaults defined in code, not external files.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Bootstrap configuration loaded from a TOML file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlayerConfig {
    /// Audio output settings
    #[serde(default)]
    pub audio: AudioConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Audio output settings
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// Output device name (None = system default device)
    #[serde(default)]
    pub device: Option<String>,

    /// Master volume, 0.0–1.0
    #[serde(default = "default_volume")]
    pub volume: f32,

    /// Output buffer size in frames (None = device default)
    #[serde(default)]
    pub buffer_size: Option<u32>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            volume: default_volume(),
            buffer_size: None,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_volume() -> f32 {
    1.0
}

fn default_log_level() -> String {
    "info".to_string()
}

impl PlayerConfig {
    /// Default config file location under the OS config directory.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tactus").join("config.toml"))
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file yields built-in defaults; a malformed file is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => {
                    debug!("No config directory available, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !path.exists() {
            debug!(
                "Config file {} not found, using defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;

        let config: PlayerConfig = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("failed to parse {}: {}", path.display(), e)))?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = PlayerConfig::default();
        assert!(config.audio.device.is_none());
        assert_eq!(config.audio.volume, 1.0);
        assert!(config.audio.buffer_size.is_none());
    }

    #[test]
    fn parses_partial_toml() {
        let config: PlayerConfig = toml::from_str(
            r#"
            [audio]
            device = "pipewire"
            volume = 0.8

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.device.as_deref(), Some("pipewire"));
        assert_eq!(config.audio.volume, 0.8);
        assert!(config.audio.buffer_size.is_none());
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: PlayerConfig = toml::from_str("").unwrap();
        assert_eq!(config.audio.volume, 1.0);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = PlayerConfig::load(Some(Path::new("/nonexistent/tactus.toml"))).unwrap();
        assert_eq!(config.audio.volume, 1.0);
    }
}
