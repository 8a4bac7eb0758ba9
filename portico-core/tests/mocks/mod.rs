//! Mock infrastructure for testing
//!
//! Provides an in-memory transport that records every call and subscription
//! and lets tests play the portal's side of the conversation.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use portico_core::error::{PortalError, Result};
use portico_core::handoff::FdBundle;
use portico_core::request::REQUEST_PATH_PREFIX;
use portico_core::transport::{
    MethodCall, Notification, Reply, ReplyKind, SignalMatch, Subscription, SubscriptionId,
    Transport, Vardict,
};
use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::time::Duration;
use tokio::sync::{Notify, mpsc, watch};
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Str, Value};

/// Unique name the mock pretends to have
pub const MOCK_UNIQUE_NAME: &str = ":1.42";

/// How long helpers wait before failing a test
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// A call as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub destination: String,
    pub path: String,
    pub interface: String,
    pub member: String,
    pub handle_token: Option<String>,
}

/// What a property read answers
#[derive(Debug, Clone)]
pub enum PropertyScript {
    Bool(bool),
    Text(String),
    Unreachable,
}

#[derive(Default)]
struct State {
    calls: Vec<RecordedCall>,
    live: HashMap<SubscriptionId, (SignalMatch, mpsc::Sender<Result<Notification>>)>,
    subscribed: Vec<SignalMatch>,
    unsubscribed: Vec<SubscriptionId>,
    next_id: u64,
    fail_calls: Option<String>,
    fail_subscribe: Option<String>,
    handle_override: Option<String>,
    respond_during_call: Option<u32>,
    property: Option<PropertyScript>,
    fd_reply: Option<(u32, Vec<OwnedFd>)>,
}

/// Recording transport standing in for the session bus
pub struct MockTransport {
    state: Mutex<State>,
    changed: Notify,
    replies_open: watch::Sender<bool>,
}

impl MockTransport {
    /// Create a mock that answers request calls immediately
    pub fn new() -> Self {
        let (replies_open, _) = watch::channel(true);
        Self {
            state: Mutex::new(State::default()),
            changed: Notify::new(),
            replies_open,
        }
    }

    /// Make request calls fail with a transport error
    pub fn fail_calls(&self, message: &str) {
        self.state.lock().fail_calls = Some(message.to_string());
    }

    /// Make subscriptions fail with a transport error
    pub fn fail_subscribe(&self, message: &str) {
        self.state.lock().fail_subscribe = Some(message.to_string());
    }

    /// Answer request calls with this handle instead of the predicted one
    pub fn override_handle(&self, path: &str) {
        self.state.lock().handle_override = Some(path.to_string());
    }

    /// Emit a response with `status` before the call itself returns
    pub fn respond_during_call(&self, status: u32) {
        self.state.lock().respond_during_call = Some(status);
    }

    /// Script the answer to property reads
    pub fn set_property(&self, script: PropertyScript) {
        self.state.lock().property = Some(script);
    }

    /// Script the next descriptor-carrying reply
    pub fn set_fd_reply(&self, index: u32, fds: Vec<OwnedFd>) {
        self.state.lock().fd_reply = Some((index, fds));
    }

    /// Keep request call replies pending until [`release_replies`](Self::release_replies)
    pub fn hold_replies(&self) {
        self.replies_open.send_replace(false);
    }

    pub fn release_replies(&self) {
        self.replies_open.send_replace(true);
    }

    /// Deliver a response on `path`; returns whether anyone was subscribed
    pub fn emit(&self, path: &str, status: u32, results: Vardict) -> bool {
        let sender = self.sender_for(path);
        match sender {
            Some(tx) => tx
                .try_send(Ok(Notification {
                    path: path.to_string(),
                    status,
                    results,
                }))
                .is_ok(),
            None => false,
        }
    }

    /// Deliver an undecodable signal on `path`
    pub fn emit_malformed(&self, path: &str, message: &str) -> bool {
        match self.sender_for(path) {
            Some(tx) => tx.try_send(Err(PortalError::transport(message))).is_ok(),
            None => false,
        }
    }

    /// Stop delivering on `path` without unsubscribing, as if the bus went away
    pub fn end_stream(&self, path: &str) {
        let mut state = self.state.lock();
        for (rule, tx) in state.live.values_mut() {
            if rule.path == path {
                // Swap in a sender whose receiver is already gone.
                let (dead, _) = mpsc::channel(1);
                *tx = dead;
            }
        }
    }

    fn sender_for(&self, path: &str) -> Option<mpsc::Sender<Result<Notification>>> {
        self.state
            .lock()
            .live
            .values()
            .find(|(rule, _)| rule.path == path)
            .map(|(_, tx)| tx.clone())
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    /// Calls of one method
    pub fn calls_to(&self, member: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.member == member)
            .collect()
    }

    /// Every subscription ever made, in order
    pub fn subscribed(&self) -> Vec<SignalMatch> {
        self.state.lock().subscribed.clone()
    }

    /// Every unsubscription, in order
    pub fn unsubscribed(&self) -> Vec<SubscriptionId> {
        self.state.lock().unsubscribed.clone()
    }

    pub fn live_subscriptions(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Wait until a subscription is live and return its path
    pub async fn wait_for_subscription(&self) -> String {
        self.wait_until(|state| state.live.values().next().map(|(rule, _)| rule.path.clone()))
            .await
    }

    /// Wait until `count` subscriptions have been made in total
    pub async fn wait_for_subscribed(&self, count: usize) -> Vec<SignalMatch> {
        self.wait_until(|state| (state.subscribed.len() >= count).then(|| state.subscribed.clone()))
            .await
    }

    /// Wait until `member` has been called `count` times
    pub async fn wait_for_calls(&self, member: &str, count: usize) -> Vec<RecordedCall> {
        self.wait_until(|state| {
            let matching: Vec<_> = state
                .calls
                .iter()
                .filter(|call| call.member == member)
                .cloned()
                .collect();
            (matching.len() >= count).then_some(matching)
        })
        .await
    }

    /// Wait until all subscriptions are gone
    pub async fn wait_for_teardown(&self) {
        self.wait_until(|state| state.live.is_empty().then_some(()))
            .await
    }

    async fn wait_until<T>(&self, check: impl Fn(&State) -> Option<T>) -> T {
        let wait = async {
            loop {
                let notified = self.changed.notified();
                if let Some(value) = check(&self.state.lock()) {
                    return value;
                }
                notified.await;
            }
        };
        tokio::time::timeout(WAIT_TIMEOUT, wait)
            .await
            .expect("Timed out waiting for mock transport")
    }

    /// Request path the portal would derive from `token`
    pub fn request_path(token: &str) -> String {
        format!("{}1_42/{}", REQUEST_PATH_PREFIX, token)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn handle_token(call: &MethodCall) -> Option<String> {
    let value: Value<'static> = call.args.options()?.get("handle_token")?.try_clone().ok()?.into();
    match value {
        Value::Str(token) => Some(token.to_string()),
        _ => None,
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn unique_name(&self) -> Result<String> {
        Ok(MOCK_UNIQUE_NAME.to_string())
    }

    async fn call(&self, call: MethodCall) -> Result<Reply> {
        let token = handle_token(&call);
        let recorded = RecordedCall {
            destination: call.destination.clone(),
            path: call.path.clone(),
            interface: call.interface.clone(),
            member: call.member.clone(),
            handle_token: token.clone(),
        };

        let (failure, handle_override, respond) = {
            let mut state = self.state.lock();
            state.calls.push(recorded);
            (
                state.fail_calls.clone(),
                state.handle_override.clone(),
                state.respond_during_call,
            )
        };
        self.changed.notify_waiters();

        if call.reply == ReplyKind::Unit {
            return Ok(Reply::Unit);
        }

        let mut open = self.replies_open.subscribe();
        open.wait_for(|open| *open)
            .await
            .map_err(|_| PortalError::transport("Mock dropped"))?;

        if let Some(message) = failure {
            return Err(PortalError::transport(message));
        }

        let token = token.ok_or_else(|| PortalError::transport("Missing handle_token"))?;
        let path = handle_override.unwrap_or_else(|| Self::request_path(&token));

        if let Some(status) = respond {
            self.emit(&path, status, Vardict::new());
        }

        let handle = OwnedObjectPath::try_from(path)
            .map_err(|e| PortalError::transport(e.to_string()))?;
        Ok(Reply::Handle(handle))
    }

    async fn call_with_fds(&self, call: MethodCall) -> Result<(u32, FdBundle)> {
        let reply = {
            let mut state = self.state.lock();
            state.calls.push(RecordedCall {
                destination: call.destination.clone(),
                path: call.path.clone(),
                interface: call.interface.clone(),
                member: call.member.clone(),
                handle_token: None,
            });
            state.fd_reply.take()
        };
        self.changed.notify_waiters();

        match reply {
            Some((index, fds)) => Ok((index, FdBundle::new(fds))),
            None => Err(PortalError::transport("No such method")),
        }
    }

    async fn get_property(
        &self,
        _destination: &str,
        _path: &str,
        _interface: &str,
        _property: &str,
    ) -> Result<OwnedValue> {
        let script = self.state.lock().property.clone();
        match script {
            Some(PropertyScript::Bool(value)) => Ok(OwnedValue::from(value)),
            Some(PropertyScript::Text(text)) => Ok(OwnedValue::from(Str::from(text))),
            Some(PropertyScript::Unreachable) | None => Err(PortalError::transport(
                "org.freedesktop.DBus.Error.ServiceUnknown",
            )),
        }
    }

    async fn subscribe(&self, rule: SignalMatch) -> Result<Subscription> {
        let mut state = self.state.lock();
        if let Some(message) = state.fail_subscribe.clone() {
            return Err(PortalError::transport(message));
        }

        state.next_id += 1;
        let id = SubscriptionId(state.next_id);
        let (tx, rx) = mpsc::channel(8);
        state.subscribed.push(rule.clone());
        state.live.insert(id, (rule, tx));
        drop(state);

        self.changed.notify_waiters();
        Ok(Subscription::new(id, rx))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        {
            let mut state = self.state.lock();
            state.live.remove(&id);
            state.unsubscribed.push(id);
        }
        self.changed.notify_waiters();
    }
}

/// Build a results dictionary with one string entry
pub fn results_with(key: &str, value: &str) -> Vardict {
    let mut results = Vardict::new();
    results.insert(key.to_string(), OwnedValue::from(Str::from(value.to_string())));
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_records_subscriptions() {
        let mock = MockTransport::new();
        let sub = mock
            .subscribe(SignalMatch::response("org.example", "/a"))
            .await
            .unwrap();
        assert_eq!(mock.live_subscriptions(), 1);
        assert!(mock.emit("/a", 0, Vardict::new()));
        assert!(!mock.emit("/b", 0, Vardict::new()));

        mock.unsubscribe(sub.id());
        assert_eq!(mock.live_subscriptions(), 0);
        assert_eq!(mock.unsubscribed(), vec![sub.id()]);
    }
}
