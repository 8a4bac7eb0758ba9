//! zbus-backed transport
//!
//! Signals are pumped from a zbus `MessageStream` into a bounded channel by
//! one task per subscription. The task table is the only shared state;
//! unsubscribing aborts the task, and dropping the stream removes the match
//! rule from the bus.

use async_trait::async_trait;
use futures_util::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use zbus::message::Type as MessageType;
use zbus::zvariant::{OwnedObjectPath, OwnedValue};
use zbus::{Connection, MatchRule, Message, MessageStream};

use super::{
    CallArgs, MethodCall, Notification, PROPERTIES_INTERFACE, Reply, ReplyKind, SignalMatch,
    Subscription, SubscriptionId, Transport, Vardict,
};
use crate::error::{PortalError, Result};
use crate::handoff::FdBundle;

/// Default capacity of each subscription's delivery channel
pub const DEFAULT_NOTIFICATION_BUFFER: usize = 8;

/// Transport over a zbus connection
pub struct DbusTransport {
    connection: Connection,
    buffer: usize,
    next_id: AtomicU64,
    subscriptions: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
}

impl DbusTransport {
    /// Connect to the session bus
    pub async fn session() -> Result<Self> {
        let connection = Connection::session().await?;
        debug!(
            "Connected to session bus as {:?}",
            connection.unique_name().map(|n| n.as_str())
        );
        Ok(Self::new(connection))
    }

    /// Wrap an existing connection
    pub fn new(connection: Connection) -> Self {
        Self {
            connection,
            buffer: DEFAULT_NOTIFICATION_BUFFER,
            next_id: AtomicU64::new(1),
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Set the capacity of subscription channels (at least 1)
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }

    /// The underlying connection
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Number of subscriptions still registered
    pub fn active_subscriptions(&self) -> usize {
        self.subscriptions.lock().len()
    }

    async fn send(&self, call: &MethodCall) -> Result<Message> {
        debug!(
            destination = %call.destination,
            path = %call.path,
            "Calling {}.{}",
            call.interface,
            call.member
        );

        let destination = Some(call.destination.as_str());
        let path = call.path.as_str();
        let interface = Some(call.interface.as_str());
        let member = call.member.as_str();

        let message = match &call.args {
            CallArgs::None => {
                self.connection
                    .call_method(destination, path, interface, member, &())
                    .await?
            }
            CallArgs::Options(options) => {
                self.connection
                    .call_method(destination, path, interface, member, &(options,))
                    .await?
            }
            CallArgs::WithParent {
                parent_window,
                options,
            } => {
                self.connection
                    .call_method(
                        destination,
                        path,
                        interface,
                        member,
                        &(parent_window.as_str(), options),
                    )
                    .await?
            }
        };

        Ok(message)
    }
}

#[async_trait]
impl Transport for DbusTransport {
    fn unique_name(&self) -> Result<String> {
        self.connection
            .unique_name()
            .map(|name| name.to_string())
            .ok_or_else(|| PortalError::transport("Connection has no unique name"))
    }

    async fn call(&self, call: MethodCall) -> Result<Reply> {
        let message = self.send(&call).await?;
        match call.reply {
            ReplyKind::Unit => Ok(Reply::Unit),
            ReplyKind::Handle => {
                let handle: OwnedObjectPath = message.body().deserialize()?;
                Ok(Reply::Handle(handle))
            }
        }
    }

    async fn call_with_fds(&self, call: MethodCall) -> Result<(u32, FdBundle)> {
        let message = self.send(&call).await?;
        decode_fd_reply(&message)
    }

    async fn get_property(
        &self,
        destination: &str,
        path: &str,
        interface: &str,
        property: &str,
    ) -> Result<OwnedValue> {
        let message = self
            .connection
            .call_method(
                Some(destination),
                path,
                Some(PROPERTIES_INTERFACE),
                "Get",
                &(interface, property),
            )
            .await?;

        Ok(message.body().deserialize()?)
    }

    async fn subscribe(&self, rule: SignalMatch) -> Result<Subscription> {
        let match_rule = MatchRule::builder()
            .msg_type(MessageType::Signal)
            .sender(rule.sender.as_str())?
            .interface(rule.interface.as_str())?
            .member(rule.member.as_str())?
            .path(rule.path.as_str())?
            .build();

        // The match rule is registered with the bus before this returns.
        let mut stream =
            MessageStream::for_match_rule(match_rule, &self.connection, Some(self.buffer)).await?;

        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(self.buffer);

        let task = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let item = message
                    .map_err(PortalError::from)
                    .and_then(|message| decode_response(&message));
                if tx.send(item).await.is_err() {
                    break;
                }
            }
            debug!("Signal stream for {} ended", id);
        });

        self.subscriptions.lock().insert(id, task);
        debug!(path = %rule.path, "Subscribed to {}.{} as {}", rule.interface, rule.member, id);

        Ok(Subscription::new(id, rx))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        match self.subscriptions.lock().remove(&id) {
            Some(task) => {
                task.abort();
                debug!("Unsubscribed {}", id);
            }
            None => warn!("Unsubscribe for unknown {}", id),
        }
    }
}

impl Drop for DbusTransport {
    fn drop(&mut self) {
        for (_, task) in self.subscriptions.lock().drain() {
            task.abort();
        }
    }
}

/// Decode a `Response (u a{sv})` signal
fn decode_response(message: &Message) -> Result<Notification> {
    let header = message.header();
    let path = header
        .path()
        .map(|path| path.to_string())
        .ok_or_else(|| PortalError::transport("Signal without object path"))?;

    let (status, results): (u32, Vardict) = message.body().deserialize()?;

    Ok(Notification {
        path,
        status,
        results,
    })
}

/// Decode a `(h)` reply into an index and its descriptor bundle
///
/// zbus resolves the `h` index against the message's descriptor list while
/// decoding, so the bundle holds that one descriptor at index 0.
fn decode_fd_reply(message: &Message) -> Result<(u32, FdBundle)> {
    let fd: zbus::zvariant::OwnedFd = message.body().deserialize()?;
    Ok((0, FdBundle::new(vec![fd.into()])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{REQUEST_INTERFACE, RESPONSE_SIGNAL};
    use std::fs::File;
    use std::io::{Read, Seek, SeekFrom, Write};
    use std::os::fd::AsFd;
    use zbus::zvariant::{Fd, Str};

    const PATH: &str = "/org/freedesktop/portal/desktop/request/1_42/portal7";

    fn response(body: &(u32, Vardict)) -> Message {
        Message::signal(PATH, REQUEST_INTERFACE, RESPONSE_SIGNAL)
            .unwrap()
            .build(body)
            .unwrap()
    }

    #[test]
    fn test_decode_response() {
        let mut results = Vardict::new();
        results.insert("uri".to_string(), OwnedValue::from(Str::from("file:///tmp/a")));

        let notification = decode_response(&response(&(0, results))).unwrap();
        assert_eq!(notification.path, PATH);
        assert_eq!(notification.status, 0);
        assert_eq!(notification.results.len(), 1);
        assert!(notification.results.contains_key("uri"));

        let cancelled = decode_response(&response(&(1, Vardict::new()))).unwrap();
        assert_eq!(cancelled.status, 1);
        assert!(cancelled.results.is_empty());
    }

    #[test]
    fn test_decode_response_wrong_signature() {
        let message = Message::signal(PATH, REQUEST_INTERFACE, RESPONSE_SIGNAL)
            .unwrap()
            .build(&("x",))
            .unwrap();

        let err = decode_response(&message).unwrap_err();
        assert!(matches!(err, PortalError::Transport(_)));
    }

    #[test]
    fn test_decode_fd_reply() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"remote").unwrap();

        let message = Message::signal("/org/freedesktop/portal/desktop", "org.example.Test", "Fd")
            .unwrap()
            .build(&(Fd::from(file.as_fd()),))
            .unwrap();

        let (index, bundle) = decode_fd_reply(&message).unwrap();
        assert_eq!(index, 0);
        assert_eq!(bundle.len(), 1);

        let mut received = File::from(bundle.duplicate(index).unwrap());
        received.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = String::new();
        received.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "remote");
    }

    #[test]
    fn test_decode_fd_reply_wrong_signature() {
        let message = Message::signal("/org/freedesktop/portal/desktop", "org.example.Test", "Fd")
            .unwrap()
            .build(&(3u32,))
            .unwrap();

        assert!(matches!(
            decode_fd_reply(&message),
            Err(PortalError::Transport(_))
        ));
    }
}
