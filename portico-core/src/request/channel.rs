//! Single-resolution result channel
//!
//! A thin layer over `tokio::sync::oneshot`. [`Resolver::resolve`] consumes
//! the resolver, so a second resolution cannot be expressed. Awaiting a
//! [`ResultChannel`] whose resolver vanished yields a transport failure
//! rather than hanging.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use super::Outcome;
use crate::error::{PortalError, Result};
use crate::transport::Vardict;

/// Create a connected resolver/channel pair
pub fn channel<T>() -> (Resolver<T>, ResultChannel<T>) {
    let (tx, rx) = oneshot::channel();
    (Resolver { tx }, ResultChannel { rx })
}

/// Writing end, held by whoever determines the outcome
#[derive(Debug)]
pub struct Resolver<T = Vardict> {
    tx: oneshot::Sender<Outcome<T>>,
}

impl<T> Resolver<T> {
    /// Deliver the outcome; returns false if nobody is waiting any more
    pub fn resolve(self, outcome: Outcome<T>) -> bool {
        self.tx.send(outcome).is_ok()
    }

    /// Whether the caller dropped its channel
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }

    /// Wait until the caller drops its channel
    pub async fn abandoned(&mut self) {
        self.tx.closed().await
    }
}

/// Caller-facing end; await it for the outcome
#[derive(Debug)]
pub struct ResultChannel<T = Vardict> {
    rx: oneshot::Receiver<Outcome<T>>,
}

impl<T> ResultChannel<T> {
    /// Wait for the outcome
    pub async fn outcome(self) -> Outcome<T> {
        self.await
    }

    /// Wait for the outcome as a `Result`, denial becoming `Cancelled`
    pub async fn into_result(self) -> Result<T> {
        self.await.into_result()
    }

    /// Take the outcome if it is already available
    pub fn try_outcome(&mut self) -> Option<Outcome<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(unresolved()),
        }
    }
}

impl<T> Future for ResultChannel<T> {
    type Output = Outcome<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| unresolved()))
    }
}

fn unresolved<T>() -> Outcome<T> {
    Outcome::Failed(PortalError::transport("Request ended without an outcome"))
}
