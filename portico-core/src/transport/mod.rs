//! Transport facade
//!
//! The request machinery never talks to a bus directly. It goes through the
//! [`Transport`] trait, which offers exactly what the portal protocol needs:
//! - method calls that eventually complete (optionally carrying descriptors)
//! - property reads
//! - signal subscriptions with explicit unsubscription
//!
//! [`DbusTransport`] implements it on top of a zbus session connection.

mod dbus;

pub use dbus::{DEFAULT_NOTIFICATION_BUFFER, DbusTransport};

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::mpsc;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};

use crate::error::{PortalError, Result};
use crate::handoff::FdBundle;

/// Well-known bus name of the portal frontend
pub const PORTAL_BUS_NAME: &str = "org.freedesktop.portal.Desktop";

/// Object path every portal interface is exported on
pub const PORTAL_OBJECT_PATH: &str = "/org/freedesktop/portal/desktop";

/// Interface of the per-call request objects
pub const REQUEST_INTERFACE: &str = "org.freedesktop.portal.Request";

/// Signal carrying a request's terminal outcome
pub const RESPONSE_SIGNAL: &str = "Response";

/// Method asking the portal to dismiss a pending request
pub const CLOSE_METHOD: &str = "Close";

/// Standard properties interface used for capability queries
pub const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

/// `a{sv}` dictionary used for call options and response results
pub type Vardict = HashMap<String, OwnedValue>;

/// Argument shapes taken by portal methods
#[derive(Debug)]
pub enum CallArgs {
    /// No arguments (e.g. `Request.Close`)
    None,
    /// `(a{sv})`
    Options(Vardict),
    /// `(s a{sv})`, parent window identifier followed by options
    WithParent {
        parent_window: String,
        options: Vardict,
    },
}

impl CallArgs {
    /// Options dictionary, if this shape carries one
    pub fn options_mut(&mut self) -> Option<&mut Vardict> {
        match self {
            Self::None => None,
            Self::Options(options) | Self::WithParent { options, .. } => Some(options),
        }
    }

    /// Options dictionary, if this shape carries one
    pub fn options(&self) -> Option<&Vardict> {
        match self {
            Self::None => None,
            Self::Options(options) | Self::WithParent { options, .. } => Some(options),
        }
    }
}

/// What a method call is expected to return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Empty reply body
    Unit,
    /// A single object path naming a request handle
    Handle,
}

/// A method call addressed to a remote object
#[derive(Debug)]
pub struct MethodCall {
    pub destination: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub args: CallArgs,
    pub reply: ReplyKind,
}

impl MethodCall {
    /// Call a method on the portal's main object
    pub fn portal(interface: impl Into<String>, member: impl Into<String>, args: CallArgs) -> Self {
        Self {
            destination: PORTAL_BUS_NAME.to_string(),
            path: PORTAL_OBJECT_PATH.to_string(),
            interface: interface.into(),
            member: member.into(),
            args,
            reply: ReplyKind::Unit,
        }
    }

    /// Override the destination bus name
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = destination.into();
        self
    }

    /// Override the target object path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Expect a reply of the given kind
    pub fn expecting(mut self, reply: ReplyKind) -> Self {
        self.reply = reply;
        self
    }
}

/// Decoded method reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Unit,
    Handle(OwnedObjectPath),
}

impl Reply {
    /// The returned request handle
    pub fn into_handle(self) -> Result<OwnedObjectPath> {
        match self {
            Self::Handle(path) => Ok(path),
            Self::Unit => Err(PortalError::transport("Expected a request handle in reply")),
        }
    }
}

/// Signal filter for a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalMatch {
    pub sender: String,
    pub interface: String,
    pub member: String,
    pub path: String,
}

impl SignalMatch {
    /// Match the `Response` signal of one request object
    pub fn response(sender: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            interface: REQUEST_INTERFACE.to_string(),
            member: RESPONSE_SIGNAL.to_string(),
            path: path.into(),
        }
    }
}

/// A delivered `Response` signal
#[derive(Debug, PartialEq)]
pub struct Notification {
    /// Object path the signal was emitted on
    pub path: String,
    /// Response code: 0 success, 1 cancelled, anything else failure
    pub status: u32,
    /// Result dictionary
    pub results: Vardict,
}

/// Identifies a live subscription in the transport's table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// Receiving end of a signal subscription
///
/// Items are `Err` when a signal arrived but could not be decoded. The
/// stream ends once the transport stops delivering for this subscription.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::Receiver<Result<Notification>>,
}

impl Subscription {
    /// Wrap a delivery channel
    pub fn new(id: SubscriptionId, receiver: mpsc::Receiver<Result<Notification>>) -> Self {
        Self { id, receiver }
    }

    /// Identifier to pass to [`Transport::unsubscribe`]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next delivered notification
    pub async fn next(&mut self) -> Option<Result<Notification>> {
        self.receiver.recv().await
    }
}

/// Message-bus operations the request machinery relies on
#[async_trait]
pub trait Transport: Send + Sync {
    /// The caller's bus-assigned unique name (e.g. `:1.42`)
    fn unique_name(&self) -> Result<String>;

    /// Issue a method call and wait for its reply
    async fn call(&self, call: MethodCall) -> Result<Reply>;

    /// Issue a method call whose reply is a single descriptor index
    ///
    /// Returns the index together with the descriptors sent alongside it.
    async fn call_with_fds(&self, call: MethodCall) -> Result<(u32, FdBundle)>;

    /// Read a property through `org.freedesktop.DBus.Properties.Get`
    async fn get_property(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        property: &str,
    ) -> Result<OwnedValue>;

    /// Start delivering signals matching `rule`
    ///
    /// Delivery is active once this returns, so a call issued afterwards
    /// cannot race past its own response.
    async fn subscribe(&self, rule: SignalMatch) -> Result<Subscription>;

    /// Stop delivering for a subscription; unknown ids are ignored
    fn unsubscribe(&self, id: SubscriptionId);
}
