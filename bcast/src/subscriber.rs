//! Subscriber handles
//!
//! A [`SubscriberHandle`] is the send-only half a subscriber gives to the
//! broadcaster. The subscriber keeps the matching `mpsc::Receiver` and drains
//! it; the broadcaster only ever sends into the handle. Once registered, the
//! handle is owned by the broadcaster, which closes it (by dropping it) when
//! the broadcaster shuts down.

use std::fmt;
use std::hash::{Hash, Hasher};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Identity of a subscriber handle
///
/// Handles compare and hash by this id, which is how the membership set and
/// `unregister` refer to them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Send-only handle a subscriber registers to receive broadcasts
///
/// Not `Clone`: registering moves the handle into the broadcaster, so the
/// same handle can never be registered twice.
pub struct SubscriberHandle<T> {
    id: SubscriberId,
    tx: mpsc::Sender<T>,
}

impl<T> SubscriberHandle<T> {
    /// Wrap an existing sender
    ///
    /// The receiver only observes closure once every clone of `tx` is gone,
    /// so keep no other clones if you rely on the broadcaster closing it.
    pub fn new(tx: mpsc::Sender<T>) -> Self {
        let id = SubscriberId::new();
        debug!(%id, "SubscriberHandle::new: called");
        Self { id, tx }
    }

    /// This handle's identity
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// True once the subscriber dropped its receiver
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Deliver one message, suspending while the subscriber's buffer is full
    ///
    /// Returns the message back if the subscriber is gone.
    pub(crate) async fn send(&self, message: T) -> Result<(), T> {
        self.tx.send(message).await.map_err(|e| e.0)
    }
}

impl<T> From<mpsc::Sender<T>> for SubscriberHandle<T> {
    fn from(tx: mpsc::Sender<T>) -> Self {
        Self::new(tx)
    }
}

impl<T> PartialEq for SubscriberHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for SubscriberHandle<T> {}

impl<T> Hash for SubscriberHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<T> fmt::Debug for SubscriberHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberHandle")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Create a subscriber handle and the receiver that drains it
///
/// A capacity of 0 is treated as 1.
pub fn channel<T>(capacity: usize) -> (SubscriberHandle<T>, mpsc::Receiver<T>) {
    debug!(capacity, "subscriber::channel: called");
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (SubscriberHandle::new(tx), rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_have_distinct_ids() {
        let (a, _rx_a) = channel::<u32>(1);
        let (b, _rx_b) = channel::<u32>(1);
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
    }

    #[test]
    fn test_handle_closed_when_receiver_dropped() {
        let (handle, rx) = channel::<u32>(1);
        assert!(!handle.is_closed());
        drop(rx);
        assert!(handle.is_closed());
    }

    #[tokio::test]
    async fn test_send_delivers() {
        let (handle, mut rx) = channel::<&str>(4);
        handle.send("hello").await.unwrap();
        assert_eq!(rx.recv().await, Some("hello"));
    }

    #[tokio::test]
    async fn test_send_to_dropped_receiver_returns_message() {
        let (handle, rx) = channel::<&str>(1);
        drop(rx);
        assert_eq!(handle.send("lost").await, Err("lost"));
    }

    #[tokio::test]
    async fn test_dropping_handle_closes_receiver() {
        let (handle, mut rx) = channel::<u32>(0);
        handle.send(7).await.unwrap();
        drop(handle);
        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn test_from_sender() {
        let (tx, _rx) = mpsc::channel::<u32>(2);
        let handle = SubscriberHandle::from(tx);
        assert!(handle.id().to_string().len() == 36);
    }
}
