//! Portal client
//!
//! Entry point tying a transport to a request coordinator, configured from
//! [`PortalSettings`].

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::camera::Camera;
use crate::config::{ConfigFile, PortalSettings};
use crate::error::{Result, ResultExt};
use crate::request::{PortalRequest, RequestCoordinator, ResultChannel};
use crate::transport::{DbusTransport, Transport};

/// Connection to xdg-desktop-portal
pub struct Portal {
    coordinator: RequestCoordinator,
}

impl Portal {
    /// Connect to the portal on the session bus with default settings
    pub async fn connect() -> Result<Self> {
        Self::connect_with(&ConfigFile::default()).await
    }

    /// Connect to the portal on the session bus using `config`
    pub async fn connect_with(config: &ConfigFile) -> Result<Self> {
        let transport = DbusTransport::session()
            .await
            .context("Connecting to session bus")?
            .with_buffer(config.requests.notification_buffer);

        let portal = Self::new(Arc::new(transport), &config.portal)?;
        info!("Using portal {} at {}", config.portal.destination, config.portal.object_path);
        Ok(portal)
    }

    /// Use an existing transport
    pub fn new(transport: Arc<dyn Transport>, settings: &PortalSettings) -> Result<Self> {
        let coordinator = RequestCoordinator::new(transport)?
            .with_service(settings.destination.as_str(), settings.object_path.as_str());
        Ok(Self { coordinator })
    }

    /// Camera operations
    pub fn camera(&self) -> Camera<'_> {
        Camera::new(&self.coordinator)
    }

    /// Start an arbitrary handle-returning portal request
    pub fn request(
        &self,
        request: PortalRequest,
        cancellation: Option<CancellationToken>,
    ) -> ResultChannel {
        self.coordinator.begin(request, cancellation)
    }

    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }
}
