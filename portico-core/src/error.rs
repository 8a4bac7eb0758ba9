//! Error types for Portico

use thiserror::Error;

/// Result type alias using PortalError
pub type Result<T> = std::result::Result<T, PortalError>;

/// Main error type for portal operations
#[derive(Debug, Error)]
pub enum PortalError {
    /// The request was cancelled by the user or by the caller
    #[error("Request cancelled")]
    Cancelled,

    /// The portal answered with a failure status
    #[error("Request denied by portal{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    RemoteDenied(Option<String>),

    /// Call dispatch, subscription or bus-level failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PortalError>,
    },
}

impl PortalError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a denial carrying the portal's reason
    pub fn denied(reason: impl Into<String>) -> Self {
        Self::RemoteDenied(Some(reason.into()))
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error, skipping context wrappers
    pub fn root(&self) -> &PortalError {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error means the user or caller backed out
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }

    /// A short hint on how the user might fix the problem
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.root() {
            Self::Transport(_) => Some(
                "Make sure a D-Bus session bus is running and xdg-desktop-portal is installed",
            ),
            Self::RemoteDenied(_) => {
                Some("Check the application's permissions in your desktop's privacy settings")
            }
            Self::Config(_) => Some("Check ~/.config/portico/config.toml, or run `portico config init`"),
            Self::Cancelled | Self::Io(_) | Self::WithContext { .. } => None,
        }
    }

    /// Whether retrying after user action can succeed
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.root(),
            Self::Cancelled | Self::RemoteDenied(_) | Self::Transport(_) | Self::Config(_)
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

// Conversions from external error types

impl From<zbus::Error> for PortalError {
    fn from(err: zbus::Error) -> Self {
        Self::Transport(format!("D-Bus error: {}", err))
    }
}

impl From<zbus::fdo::Error> for PortalError {
    fn from(err: zbus::fdo::Error) -> Self {
        Self::Transport(format!("D-Bus error: {}", err))
    }
}

impl From<zbus::zvariant::Error> for PortalError {
    fn from(err: zbus::zvariant::Error) -> Self {
        Self::Transport(format!("Malformed message: {}", err))
    }
}
