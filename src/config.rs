use crate::input::Accelerator;
use crate::tray::icon::ICON_IDLE;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config directory")]
    NoConfigDir,

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub hotkey: HotkeyConfig,

    #[serde(default)]
    pub tray: TrayConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HotkeyConfig {
    /// Accelerator that opens the notes (e.g., "Super+E", "<Control><Alt>n")
    #[serde(default = "default_open_notes")]
    pub open_notes: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for HotkeyConfig {
    fn default() -> Self {
        Self {
            open_notes: default_open_notes(),
            enabled: true,
        }
    }
}

fn default_open_notes() -> String {
    "Super+E".to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TrayConfig {
    /// Show sync progress on the panel icon, not only in the menu
    #[serde(default = "default_true")]
    pub show_panel_progress: bool,

    /// Freedesktop icon name shown while idle
    #[serde(default = "default_icon_name")]
    pub icon_name: String,
}

impl Default for TrayConfig {
    fn default() -> Self {
        Self {
            show_panel_progress: true,
            icon_name: default_icon_name(),
        }
    }
}

fn default_icon_name() -> String {
    ICON_IDLE.to_string()
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
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

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    fn project_dirs() -> Result<ProjectDirs, ConfigError> {
        ProjectDirs::from("com", "everpad", "everpad-indicator").ok_or(ConfigError::NoConfigDir)
    }

    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        Ok(Self::project_dirs()?.config_dir().to_path_buf())
    }

    /// Get the data directory path (crash reports)
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from file, or create default if not exists
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let contents = fs::read_to_string(path)?;
            let config: Config = toml::from_str(&contents)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Read the config file if one exists, without creating or validating it.
    pub fn peek() -> Option<Self> {
        Self::peek_from(&Self::config_path().ok()?)
    }

    pub fn peek_from(path: &Path) -> Option<Self> {
        let contents = fs::read_to_string(path).ok()?;
        toml::from_str(&contents).ok()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        Accelerator::parse(&self.hotkey.open_notes).map_err(|e| {
            ConfigError::ValidationError(format!("hotkey.open_notes: {}", e))
        })?;

        if self.tray.icon_name.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "tray.icon_name cannot be empty".into(),
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging.level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        Ok(())
    }

    /// Save config to file
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Create config directory if needed
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        info!("Config saved to: {}", path.display());
        Ok(())
    }

    /// The open-notes accelerator, or `None` when the hotkey is disabled.
    pub fn accelerator(&self) -> Result<Option<Accelerator>, ConfigError> {
        if !self.hotkey.enabled {
            return Ok(None);
        }
        Accelerator::parse(&self.hotkey.open_notes)
            .map(Some)
            .map_err(|e| ConfigError::ValidationError(format!("hotkey.open_notes: {}", e)))
    }
}
