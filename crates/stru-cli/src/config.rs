//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Configuration for stru
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service origin (default: https://api.stru.ai)
    pub base_url: Option<String>,
    /// User id sent with every completion request
    pub user_id: Option<String>,
    /// TCP connect timeout in seconds
    pub connect_timeout_secs: Option<u64>,
    /// Retries when opening a completion stream fails
    pub max_retries: Option<u32>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stru")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        // Check for STRU_CONFIG_PATH env var first
        if let Ok(path) = std::env::var("STRU_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to parse config file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&path, example_config())?;
        Ok(path)
    }

    /// Resolve the service origin: CLI flag, then env, then file, then default
    pub fn resolve_base_url(&self, flag: Option<&str>) -> String {
        flag.map(str::to_string)
            .or_else(|| std::env::var("STRU_BASE_URL").ok())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| stru_api::DEFAULT_BASE_URL.to_string())
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# stru configuration file
# Place at ~/.config/stru/config.toml (Linux/Mac) or %APPDATA%\stru\config.toml (Windows)

# Service origin
base_url = "https://api.stru.ai"

# User id sent with completion requests (defaults to your login email)
# user_id = "me@example.com"

# TCP connect timeout in seconds
connect_timeout_secs = 10

# Retries when a completion request cannot be opened (429, 5xx, network)
max_retries = 2
"#
}
