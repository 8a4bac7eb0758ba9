//! Camera portal
//!
//! `org.freedesktop.portal.Camera` lets sandboxed applications:
//! - check whether any camera is present
//! - ask the user for camera access
//! - open a PipeWire remote exposing only the camera nodes

use std::os::fd::OwnedFd;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::Result;
use crate::handoff;
use crate::request::{PortalRequest, RequestCoordinator, ResultChannel};
use crate::transport::{CallArgs, MethodCall, Vardict};

/// Camera portal interface name
pub const CAMERA_INTERFACE: &str = "org.freedesktop.portal.Camera";

/// Camera operations, borrowed from a [`Portal`](crate::Portal)
pub struct Camera<'a> {
    coordinator: &'a RequestCoordinator,
}

impl<'a> Camera<'a> {
    pub fn new(coordinator: &'a RequestCoordinator) -> Self {
        Self { coordinator }
    }

    /// Whether the system has any camera
    ///
    /// Returns `false` when the property cannot be read, e.g. because no
    /// portal is running or it predates the camera interface.
    pub async fn is_present(&self) -> bool {
        let value = match self
            .coordinator
            .transport()
            .get_property(
                self.coordinator.destination(),
                self.coordinator.object_path(),
                CAMERA_INTERFACE,
                "IsCameraPresent",
            )
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to get IsCameraPresent property: {}", e);
                return false;
            }
        };

        match bool::try_from(value) {
            Ok(present) => {
                debug!("IsCameraPresent = {}", present);
                present
            }
            Err(e) => {
                warn!("IsCameraPresent is not a boolean: {}", e);
                false
            }
        }
    }

    /// Start a camera access request
    ///
    /// The portal may show a permission dialog; the channel resolves once the
    /// user has answered.
    pub fn access(&self, cancellation: Option<CancellationToken>) -> ResultChannel {
        self.coordinator.begin(
            PortalRequest::with_options(CAMERA_INTERFACE, "AccessCamera", Vardict::new()),
            cancellation,
        )
    }

    /// Request camera access and wait for the answer
    ///
    /// Errors with [`PortalError::Cancelled`](crate::PortalError::Cancelled)
    /// when the user declines or `cancellation` fires.
    pub async fn access_camera(&self, cancellation: Option<CancellationToken>) -> Result<()> {
        self.access(cancellation).await.into_result().map(|_| ())
    }

    /// Open a PipeWire remote that only exposes camera nodes
    ///
    /// Access must have been granted first. The returned descriptor belongs
    /// to the caller.
    pub async fn open_pipewire_remote(&self) -> Result<OwnedFd> {
        let call = MethodCall::portal(
            CAMERA_INTERFACE,
            "OpenPipeWireRemote",
            CallArgs::Options(Vardict::new()),
        )
        .with_destination(self.coordinator.destination())
        .with_path(self.coordinator.object_path());

        handoff::open_handoff(self.coordinator.transport().as_ref(), call).await
    }
}
