//! Configuration file loading
//!
//! Loads user configuration from `~/.config/portico/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{PortalSettings, RequestSettings};
use crate::error::{PortalError, Result};

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Portal service coordinates
    #[serde(default)]
    pub portal: PortalSettings,

    /// Request waiting policy
    #[serde(default)]
    pub requests: RequestSettings,
}

impl ConfigFile {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("portico").join("config.toml")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("portico")
                .join("config.toml")
        } else {
            PathBuf::from("/etc/portico/config.toml")
        }
    }

    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from(Self::default_path())
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| PortalError::Config(format!("Failed to read config file: {}", e)))?;

        let config: ConfigFile = toml::from_str(&content)
            .map_err(|e| PortalError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load configuration, logging warnings but returning defaults on error
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                warn!("Failed to load config file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Check every section
    pub fn validate(&self) -> Result<()> {
        self.portal.validate()?;
        self.requests.validate()
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PortalError::Config(format!("Failed to serialize config: {}", e)))?;

        write_config(&path, &content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Write the commented sample configuration to `path`
    ///
    /// Refuses to replace an existing file unless `force` is set. Returns
    /// whether the file was written.
    pub fn write_sample(path: PathBuf, force: bool) -> Result<bool> {
        if path.exists() && !force {
            debug!("Keeping existing config at {:?}", path);
            return Ok(false);
        }

        write_config(&path, &sample_config())?;
        info!("Wrote sample configuration to {:?}", path);
        Ok(true)
    }
}

fn write_config(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            PortalError::Config(format!("Failed to create config directory: {}", e))
        })?;
    }

    std::fs::write(path, content)
        .map_err(|e| PortalError::Config(format!("Failed to write config file: {}", e)))
}

/// Generate a sample configuration file
pub fn sample_config() -> String {
    r#"# Portico Configuration

[portal]
# Bus name of the portal frontend
destination = "org.freedesktop.portal.Desktop"

# Object path the portal interfaces live on
object_path = "/org/freedesktop/portal/desktop"

[requests]
# Stop waiting for an answer after this many seconds (0 = wait for the user)
timeout_secs = 0

# Responses buffered per pending request
notification_buffer = 8
"#
    .to_string()
}
