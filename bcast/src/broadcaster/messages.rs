//! Request types carried by the registration queues

use tokio::sync::oneshot;

use crate::subscriber::{SubscriberHandle, SubscriberId};

/// Add a handle to the membership set
pub(crate) struct RegisterRequest<T> {
    pub handle: SubscriberHandle<T>,
    /// Acknowledged once the handle is a member
    pub ack: oneshot::Sender<SubscriberId>,
}

/// Remove a handle from the membership set
pub(crate) struct UnregisterRequest<T> {
    pub id: SubscriberId,
    /// Receives the removed handle, or `None` if it was not a member
    pub reply: oneshot::Sender<Option<SubscriberHandle<T>>>,
}

impl<T> RegisterRequest<T> {
    pub(crate) fn new(handle: SubscriberHandle<T>) -> (Self, oneshot::Receiver<SubscriberId>) {
        let (ack, ack_rx) = oneshot::channel();
        (Self { handle, ack }, ack_rx)
    }
}

impl<T> UnregisterRequest<T> {
    pub(crate) fn new(id: SubscriberId) -> (Self, oneshot::Receiver<Option<SubscriberHandle<T>>>) {
        let (reply, reply_rx) = oneshot::channel();
        (Self { id, reply }, reply_rx)
    }
}

/// A submitted message on its way through the input queue
pub(crate) struct Envelope<T> {
    pub message: T,
    /// Unbuffered broadcasters: signalled when the coordinator takes the message
    pub taken: Option<oneshot::Sender<()>>,
}

impl<T> Envelope<T> {
    pub(crate) fn new(message: T) -> Self {
        Self { message, taken: None }
    }

    /// Envelope whose submitter waits until the coordinator dequeues it
    pub(crate) fn rendezvous(message: T) -> (Self, oneshot::Receiver<()>) {
        let (taken, taken_rx) = oneshot::channel();
        (
            Self {
                message,
                taken: Some(taken),
            },
            taken_rx,
        )
    }
}
