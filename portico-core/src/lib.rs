//! Portico Core Library
//!
//! Async access to xdg-desktop-portal for sandboxed applications.
//!
//! This library provides:
//! - A request coordinator running the portal's handle/Response protocol,
//!   with race-free cancellation
//! - Camera presence checks, camera access requests and the PipeWire remote
//!   handoff
//! - A transport facade over zbus, swappable for tests
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────┐   ┌──────────────┐
//! │ Camera / ... │──▶│ Request Coordinator │──▶│  Transport   │
//! │ operations   │◀──│ (one task/request)  │◀──│  (zbus)      │
//! └──────────────┘   └─────────────────────┘   └──────────────┘
//!        ▲                    │
//!        └── ResultChannel ◀──┘
//! ```

pub mod camera;
pub mod config;
pub mod error;
pub mod handoff;
pub mod portal;
pub mod request;
pub mod transport;

pub use camera::Camera;
pub use config::{ConfigFile, PortalSettings, RequestSettings};
pub use error::{PortalError, Result};
pub use portal::Portal;
pub use request::{Outcome, PortalRequest, RequestCoordinator, ResultChannel};
pub use transport::{DbusTransport, Transport, Vardict};

pub use tokio_util::sync::CancellationToken;
