//! Portal request lifecycle
//!
//! Every privileged portal method follows the same protocol:
//! 1. the call returns a handle naming an in-flight request object
//! 2. the request object later emits one `Response` signal with the outcome
//! 3. the caller may ask the portal to `Close` the request meanwhile
//!
//! [`RequestCoordinator`] runs that protocol for any [`PortalRequest`] and
//! resolves a [`ResultChannel`] exactly once.

mod channel;
mod coordinator;
mod handle;

pub use channel::{Resolver, ResultChannel, channel};
pub use coordinator::RequestCoordinator;
pub use handle::{
    HANDLE_TOKEN_KEY, HandleAllocator, HandleToken, REQUEST_PATH_PREFIX, RequestPath,
    escape_sender,
};

use crate::error::{PortalError, Result};
use crate::transport::{CallArgs, Vardict};

/// Response code: the request succeeded
pub const RESPONSE_SUCCESS: u32 = 0;

/// Response code: the user cancelled the interaction
pub const RESPONSE_CANCELLED: u32 = 1;

/// A handle-returning portal method call
#[derive(Debug)]
pub struct PortalRequest {
    pub interface: String,
    pub method: String,
    pub args: CallArgs,
}

impl PortalRequest {
    /// Describe a call of `interface.method` with the given arguments
    pub fn new(interface: impl Into<String>, method: impl Into<String>, args: CallArgs) -> Self {
        Self {
            interface: interface.into(),
            method: method.into(),
            args,
        }
    }

    /// Describe a call taking only an options dictionary
    pub fn with_options(
        interface: impl Into<String>,
        method: impl Into<String>,
        options: Vardict,
    ) -> Self {
        Self::new(interface, method, CallArgs::Options(options))
    }
}

/// Terminal result of one request
#[derive(Debug)]
pub enum Outcome<T = Vardict> {
    /// The portal granted the request
    Granted(T),
    /// The user or the caller cancelled
    Denied,
    /// The portal refused, or the request could not be carried out
    ///
    /// Bus and decoding failures arrive as [`PortalError::Transport`],
    /// refusals as [`PortalError::RemoteDenied`].
    Failed(PortalError),
}

impl Outcome<Vardict> {
    /// Map a `Response` signal's code and results to an outcome
    pub fn from_response(status: u32, results: Vardict) -> Self {
        match status {
            RESPONSE_SUCCESS => Self::Granted(results),
            RESPONSE_CANCELLED => Self::Denied,
            2 => Self::Failed(PortalError::RemoteDenied(None)),
            other => Self::Failed(PortalError::denied(format!("response code {}", other))),
        }
    }
}

impl<T> Outcome<T> {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied)
    }

    /// Transform the granted payload
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Granted(payload) => Outcome::Granted(f(payload)),
            Self::Denied => Outcome::Denied,
            Self::Failed(e) => Outcome::Failed(e),
        }
    }

    /// Convert to a `Result`, reporting a denial as [`PortalError::Cancelled`]
    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Granted(payload) => Ok(payload),
            Self::Denied => Err(PortalError::Cancelled),
            Self::Failed(e) => Err(e),
        }
    }

    /// Short name for logs and reports
    pub fn label(&self) -> &'static str {
        match self {
            Self::Granted(_) => "granted",
            Self::Denied => "denied",
            Self::Failed(_) => "failed",
        }
    }
}
