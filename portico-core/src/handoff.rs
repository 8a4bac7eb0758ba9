//! File descriptor handoff
//!
//! Some portal methods answer with an index into the descriptors sent
//! alongside the reply. [`FdBundle`] holds those descriptors and hands out
//! independent duplicates, so the caller's descriptor outlives the reply.

use std::os::fd::{AsFd, OwnedFd};
use tracing::warn;

use crate::error::{PortalError, Result};
use crate::transport::{MethodCall, Transport};

/// Descriptors that arrived with a method reply
#[derive(Debug, Default)]
pub struct FdBundle {
    fds: Vec<OwnedFd>,
}

impl FdBundle {
    /// Take ownership of received descriptors
    pub fn new(fds: Vec<OwnedFd>) -> Self {
        Self { fds }
    }

    /// Number of descriptors in the bundle
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    /// Whether the bundle carries no descriptors
    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }

    /// Duplicate the descriptor at `index` into a caller-owned one
    ///
    /// The duplicate is close-on-exec and unrelated to the bundle afterwards.
    pub fn duplicate(&self, index: u32) -> Result<OwnedFd> {
        let fd = self.fds.get(index as usize).ok_or_else(|| {
            PortalError::transport(format!(
                "Descriptor index {} out of range ({} received)",
                index,
                self.fds.len()
            ))
        })?;

        Ok(fd.as_fd().try_clone_to_owned()?)
    }
}

impl From<Vec<OwnedFd>> for FdBundle {
    fn from(fds: Vec<OwnedFd>) -> Self {
        Self::new(fds)
    }
}

/// Call a method answering `(h)` and take ownership of the named descriptor
///
/// Failures are logged here as well as returned, so callers that only want
/// a descriptor-or-nothing can drop the error.
pub async fn open_handoff(transport: &dyn Transport, call: MethodCall) -> Result<OwnedFd> {
    let member = format!("{}.{}", call.interface, call.member);

    let (index, bundle) = match transport.call_with_fds(call).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Failed to get descriptor from {}: {}", member, e);
            return Err(e);
        }
    };

    bundle.duplicate(index).map_err(|e| {
        warn!("Failed to take descriptor from {}: {}", member, e);
        e
    })
}
