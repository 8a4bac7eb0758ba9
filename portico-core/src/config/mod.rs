//! Configuration types for Portico
//!
//! Service coordinates of the portal and caller-side request policy.

mod file;

pub use file::{ConfigFile, sample_config};

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{PortalError, Result};
use crate::transport::{PORTAL_BUS_NAME, PORTAL_OBJECT_PATH};

/// Where the portal service lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSettings {
    /// Bus name of the portal frontend
    #[serde(default = "default_destination")]
    pub destination: String,

    /// Object path the portal interfaces are exported on
    #[serde(default = "default_object_path")]
    pub object_path: String,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            destination: default_destination(),
            object_path: default_object_path(),
        }
    }
}

impl PortalSettings {
    /// Check the coordinates are usable bus addresses
    pub fn validate(&self) -> Result<()> {
        if self.destination.is_empty() {
            return Err(PortalError::config("portal.destination must not be empty"));
        }
        if !self.object_path.starts_with('/') {
            return Err(PortalError::config(format!(
                "portal.object_path must be absolute, got '{}'",
                self.object_path
            )));
        }
        Ok(())
    }
}

/// How callers wait on requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSettings {
    /// Give up waiting after this many seconds (0 = wait for the user)
    #[serde(default)]
    pub timeout_secs: u64,

    /// Capacity of each response subscription's channel
    #[serde(default = "default_notification_buffer")]
    pub notification_buffer: usize,
}

impl Default for RequestSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 0,
            notification_buffer: default_notification_buffer(),
        }
    }
}

impl RequestSettings {
    /// Wait limit, if any
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }

    pub fn validate(&self) -> Result<()> {
        if self.notification_buffer == 0 {
            return Err(PortalError::config(
                "requests.notification_buffer must be at least 1",
            ));
        }
        Ok(())
    }
}

fn default_destination() -> String {
    PORTAL_BUS_NAME.to_string()
}

fn default_object_path() -> String {
    PORTAL_OBJECT_PATH.to_string()
}

fn default_notification_buffer() -> usize {
    crate::transport::DEFAULT_NOTIFICATION_BUFFER
}
