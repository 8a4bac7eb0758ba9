//! Request coordinator
//!
//! Each request is driven by one spawned task that owns a [`RequestCall`]
//! guard. Every trigger (response signal, call reply, cancellation, caller
//! dropping its channel) is awaited in the same `select!` loop, so the guard
//! only ever has one writer. Resolution consumes the guard and teardown runs
//! in its `Drop`, which makes "resolve then tear down" a single step that
//! happens once whatever path gets there first.
//!
//! ```text
//!   begin() ──▶ subscribe(Response @ path) ──▶ call(method, handle_token)
//!                              │
//!        ┌─────────────────────┼───────────────────────┐
//!        ▼                     ▼                       ▼
//!   Response signal       call failed            cancellation / caller gone
//!   0/1/other             Failed(Transport)      Close (once) once the handle is known
//!        │                     │
//!        └──────▶ resolve ─────┘──▶ Drop: unsubscribe + detach observer
//! ```

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use zbus::zvariant::{OwnedValue, Str};

use super::channel::{self, Resolver, ResultChannel};
use super::handle::{HANDLE_TOKEN_KEY, HandleAllocator};
use super::{Outcome, PortalRequest};
use crate::error::{PortalError, Result};
use crate::transport::{
    CLOSE_METHOD, CallArgs, MethodCall, PORTAL_BUS_NAME, PORTAL_OBJECT_PATH, REQUEST_INTERFACE,
    Reply, ReplyKind, SignalMatch, Subscription, SubscriptionId, Transport, Vardict,
};

/// Starts portal requests and drives them to a single outcome
pub struct RequestCoordinator {
    transport: Arc<dyn Transport>,
    handles: HandleAllocator,
    destination: String,
    object_path: String,
}

impl RequestCoordinator {
    /// Create a coordinator for the portal reachable through `transport`
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self> {
        let unique_name = transport.unique_name()?;
        let handles = HandleAllocator::new(&unique_name)?;
        debug!("Request coordinator ready for sender {}", handles.sender());

        Ok(Self {
            transport,
            handles,
            destination: PORTAL_BUS_NAME.to_string(),
            object_path: PORTAL_OBJECT_PATH.to_string(),
        })
    }

    /// Address a different portal service
    pub fn with_service(
        mut self,
        destination: impl Into<String>,
        object_path: impl Into<String>,
    ) -> Self {
        self.destination = destination.into();
        self.object_path = object_path.into();
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Bus name requests are sent to
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Object path requests are sent to
    pub fn object_path(&self) -> &str {
        &self.object_path
    }

    /// Start a request and return the channel its outcome will arrive on
    ///
    /// Returns immediately; the request runs on a spawned task, so this must
    /// be called from within a tokio runtime. If `cancellation` fires before
    /// the portal answers, the portal is asked to close the request and the
    /// outcome is whatever its response then reports.
    pub fn begin(
        &self,
        request: PortalRequest,
        cancellation: Option<CancellationToken>,
    ) -> ResultChannel {
        let (resolver, channel) = channel::channel();
        let (token, path) = self.handles.allocate();

        let PortalRequest {
            interface,
            method,
            mut args,
        } = request;

        let token_value = OwnedValue::from(Str::from(token.as_str().to_string()));
        match args.options_mut() {
            Some(options) => {
                options.insert(HANDLE_TOKEN_KEY.to_string(), token_value);
            }
            None => {
                let mut options = Vardict::new();
                options.insert(HANDLE_TOKEN_KEY.to_string(), token_value);
                args = CallArgs::Options(options);
            }
        }

        debug!(path = %path, "Starting {}.{}", interface, method);

        let label = format!("{}.{}", interface, method);
        let call = MethodCall::portal(interface, method, args)
            .with_destination(self.destination.as_str())
            .with_path(self.object_path.as_str())
            .expecting(ReplyKind::Handle);

        let state = RequestCall {
            transport: Arc::clone(&self.transport),
            destination: self.destination.clone(),
            path: path.as_str().to_string(),
            label,
            subscription: None,
            observer: cancellation,
            resolver: Some(resolver),
            close_wanted: false,
            close_sent: false,
        };

        tokio::spawn(drive(state, call));

        channel
    }
}

/// Mutable state of one outstanding request
///
/// Dropping it is the teardown: the subscription is removed and the
/// cancellation observer released.
struct RequestCall {
    transport: Arc<dyn Transport>,
    destination: String,
    path: String,
    label: String,
    subscription: Option<SubscriptionId>,
    observer: Option<CancellationToken>,
    resolver: Option<Resolver>,
    close_wanted: bool,
    close_sent: bool,
}

impl RequestCall {
    /// Resolve the channel and tear down
    fn finish(mut self, outcome: Outcome) {
        match &outcome {
            Outcome::Granted(_) => info!(path = %self.path, "{} granted", self.label),
            Outcome::Denied => info!(path = %self.path, "{} cancelled", self.label),
            Outcome::Failed(e) => warn!(path = %self.path, "{} failed: {}", self.label, e),
        }

        match self.resolver.take() {
            Some(resolver) => {
                if !resolver.resolve(outcome) {
                    debug!(path = %self.path, "Outcome dropped, caller stopped waiting");
                }
            }
            None => debug!(path = %self.path, "Already resolved, ignoring late outcome"),
        }
    }

    async fn subscribe(&mut self) -> Result<Subscription> {
        let subscription = self
            .transport
            .subscribe(SignalMatch::response(
                self.destination.as_str(),
                self.path.as_str(),
            ))
            .await?;
        self.subscription = Some(subscription.id());
        Ok(subscription)
    }

    /// Follow a request object the portal placed somewhere else
    async fn retarget(&mut self, path: String) -> Result<Subscription> {
        if let Some(id) = self.subscription.take() {
            self.transport.unsubscribe(id);
        }
        self.path = path;
        self.subscribe().await
    }

    /// Ask the portal to dismiss the request; never waits, never fails
    fn send_close(&mut self) {
        if self.close_sent {
            return;
        }
        self.close_sent = true;

        let transport = Arc::clone(&self.transport);
        let call = MethodCall::portal(REQUEST_INTERFACE, CLOSE_METHOD, CallArgs::None)
            .with_destination(self.destination.as_str())
            .with_path(self.path.as_str());
        let path = self.path.clone();

        debug!(path = %path, "Closing request");
        tokio::spawn(async move {
            if let Err(e) = transport.call(call).await {
                debug!(path = %path, "Close failed: {}", e);
            }
        });
    }
}

impl Drop for RequestCall {
    fn drop(&mut self) {
        self.observer.take();
        if let Some(id) = self.subscription.take() {
            self.transport.unsubscribe(id);
        }
        debug!(path = %self.path, "Request torn down");
    }
}

async fn cancellation(observer: Option<&CancellationToken>) {
    match observer {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

async fn abandonment(resolver: Option<&mut Resolver>) {
    match resolver {
        Some(resolver) => resolver.abandoned().await,
        None => std::future::pending().await,
    }
}

async fn drive(mut state: RequestCall, call: MethodCall) {
    // Subscribe before dispatching so a fast response cannot be missed.
    let mut subscription = match state.subscribe().await {
        Ok(subscription) => subscription,
        Err(e) => {
            debug!(path = %state.path, "Subscribing to response failed");
            return state.finish(Outcome::Failed(e));
        }
    };

    let transport = Arc::clone(&state.transport);
    let dispatch = transport.call(call);
    tokio::pin!(dispatch);
    let mut dispatched = false;

    loop {
        tokio::select! {
            biased;

            delivered = subscription.next() => match delivered {
                Some(Ok(notification)) => {
                    if notification.path != state.path {
                        debug!(path = %notification.path, "Ignoring response for another request");
                        continue;
                    }
                    return state.finish(Outcome::from_response(
                        notification.status,
                        notification.results,
                    ));
                }
                Some(Err(e)) => {
                    debug!(path = %state.path, "Undecodable response");
                    return state.finish(Outcome::Failed(e));
                }
                None if state.close_wanted => return state.finish(Outcome::Denied),
                None => {
                    return state.finish(Outcome::Failed(PortalError::transport(
                        "Response stream closed before an outcome arrived",
                    )));
                }
            },

            reply = &mut dispatch, if !dispatched => {
                dispatched = true;
                let handle = match reply.and_then(Reply::into_handle) {
                    Ok(handle) => handle,
                    Err(e) => return state.finish(Outcome::Failed(e)),
                };

                if handle.as_str() != state.path {
                    warn!(
                        expected = %state.path,
                        actual = %handle.as_str(),
                        "Portal ignored handle_token, following its request object"
                    );
                    subscription = match state.retarget(handle.as_str().to_string()).await {
                        Ok(subscription) => subscription,
                        Err(e) => return state.finish(Outcome::Failed(e)),
                    };
                } else {
                    debug!(path = %state.path, "Request in flight");
                }

                if state.close_wanted {
                    state.send_close();
                }
            },

            _ = cancellation(state.observer.as_ref()) => {
                debug!(path = %state.path, "Cancellation requested");
                state.observer = None;
                state.close_wanted = true;
                // The request object only exists once the call has returned.
                if dispatched {
                    state.send_close();
                }
            },

            _ = abandonment(state.resolver.as_mut()) => {
                debug!(path = %state.path, "Caller dropped its channel");
                state.resolver = None;

                // The request object exists once the call returns; close it then.
                if !dispatched {
                    match (&mut dispatch).await.and_then(Reply::into_handle) {
                        Ok(handle) => state.path = handle.as_str().to_string(),
                        Err(e) => {
                            debug!(path = %state.path, "No request to close: {}", e);
                            return;
                        }
                    }
                }
                state.send_close();
                return;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancellation_helper_without_token_pends() {
        let pending = tokio::time::timeout(
            std::time::Duration::from_millis(10),
            cancellation(None),
        )
        .await;
        assert!(pending.is_err());

        let token = CancellationToken::new();
        token.cancel();
        cancellation(Some(&token)).await;
    }
}
