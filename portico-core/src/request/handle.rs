//! Request handle allocation
//!
//! The portal names each request object `<prefix>/<sender>/<token>`, where
//! `sender` is the caller's unique bus name without the leading `:` and with
//! dots replaced by underscores. Passing our own token as `handle_token` lets
//! us know that path before the call is made.

use crate::error::{PortalError, Result};

/// Prefix of every request object path
pub const REQUEST_PATH_PREFIX: &str = "/org/freedesktop/portal/desktop/request/";

/// Option key carrying the caller-chosen token
pub const HANDLE_TOKEN_KEY: &str = "handle_token";

/// Opaque per-request token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HandleToken(String);

impl HandleToken {
    /// Draw a fresh token from a 64-bit random space
    pub fn random() -> Self {
        Self(format!("portal{}", rand::random::<u64>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for HandleToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Object path the portal emits a request's `Response` on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestPath(String);

impl RequestPath {
    /// Compose the path for `sender` (already escaped) and `token`
    pub fn new(sender: &str, token: &HandleToken) -> Self {
        Self(format!("{}{}/{}", REQUEST_PATH_PREFIX, sender, token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turn a unique bus name (`:1.42`) into a path element (`1_42`)
pub fn escape_sender(unique_name: &str) -> Result<String> {
    let name = unique_name.strip_prefix(':').ok_or_else(|| {
        PortalError::transport(format!("'{}' is not a unique bus name", unique_name))
    })?;

    if name.is_empty() {
        return Err(PortalError::transport("Empty unique bus name"));
    }

    Ok(name.replace('.', "_"))
}

/// Mints tokens and request paths for one connection
#[derive(Debug, Clone)]
pub struct HandleAllocator {
    sender: String,
}

impl HandleAllocator {
    /// Create an allocator for the connection with this unique name
    pub fn new(unique_name: &str) -> Result<Self> {
        Ok(Self {
            sender: escape_sender(unique_name)?,
        })
    }

    /// Escaped sender element used in paths
    pub fn sender(&self) -> &str {
        &self.sender
    }

    /// Mint a new token and the path its response will arrive on
    pub fn allocate(&self) -> (HandleToken, RequestPath) {
        let token = HandleToken::random();
        let path = RequestPath::new(&self.sender, &token);
        (token, path)
    }
}
