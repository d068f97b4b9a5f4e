//! Broadcaster - the public handle producers and subscribers share

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::BroadcasterConfig;
use super::core::{Coordinator, ExitReason};
use super::messages::{Envelope, RegisterRequest, UnregisterRequest};
use super::metrics::{BroadcasterMetrics, Counters};
use crate::error::{BroadcastError, BroadcastResult};
use crate::subscriber::{SubscriberHandle, SubscriberId};

type CoordinatorTask<T> = JoinHandle<(Coordinator<T>, ExitReason)>;

struct Shared<T> {
    input_tx: mpsc::Sender<Envelope<T>>,
    /// Unbuffered: `submit` returns only once the coordinator took the message
    rendezvous: bool,
    reg_tx: mpsc::Sender<RegisterRequest<T>>,
    unreg_tx: mpsc::Sender<UnregisterRequest<T>>,
    stop: CancellationToken,
    /// Taken exactly once, by the teardown
    task: Mutex<Option<CoordinatorTask<T>>>,
    closed: OnceCell<()>,
    counters: Arc<Counters>,
    /// Set by the coordinator while it waits for work
    parked: Arc<AtomicBool>,
}

impl<T> Drop for Shared<T> {
    // Last handle gone: unblock a fan-out stuck on a slow subscriber
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

/// Handle to a running broadcaster
///
/// Cloning is cheap; every clone talks to the same coordinator. Dropping the
/// last clone without calling [`Broadcaster::close`] also stops the
/// coordinator, which then drops (closes) every member handle.
pub struct Broadcaster<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Broadcaster<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Clone + Send + 'static> Broadcaster<T> {
    /// Create a broadcaster with the given input buffer and spawn its coordinator
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(buffer_capacity: usize) -> Self {
        Self::with_config(&BroadcasterConfig::with_buffer(buffer_capacity))
    }

    /// Create a broadcaster from config and spawn its coordinator
    pub fn with_config(config: &BroadcasterConfig) -> Self {
        debug!(buffer_capacity = config.buffer_capacity, "Broadcaster::with_config: called");
        let (input_tx, input_rx) = mpsc::channel(config.input_bound());
        let (reg_tx, reg_rx) = mpsc::channel(1);
        let (unreg_tx, unreg_rx) = mpsc::channel(1);
        let stop = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let parked = Arc::new(AtomicBool::new(false));

        let coordinator = Coordinator::new(
            input_rx,
            reg_rx,
            unreg_rx,
            stop.clone(),
            Arc::clone(&counters),
            Arc::clone(&parked),
        );
        let task = tokio::spawn(coordinator.run());

        Self {
            shared: Arc::new(Shared {
                input_tx,
                rendezvous: config.buffer_capacity == 0,
                reg_tx,
                unreg_tx,
                stop,
                task: Mutex::new(Some(task)),
                closed: OnceCell::new(),
                counters,
                parked,
            }),
        }
    }

    /// Register a handle to receive every message submitted from now on
    ///
    /// Returns once the coordinator has added it to the membership set.
    pub async fn register(&self, handle: SubscriberHandle<T>) -> BroadcastResult<SubscriberId> {
        debug!(subscriber = %handle.id(), "Broadcaster::register: called");
        let (request, ack) = RegisterRequest::new(handle);
        self.shared
            .reg_tx
            .send(request)
            .await
            .map_err(|_| BroadcastError::Closed)?;
        ack.await.map_err(|_| BroadcastError::Closed)
    }

    /// Stop delivering to a handle
    ///
    /// Returns the handle, still open, once the coordinator has removed it;
    /// `None` if it was not a member.
    pub async fn unregister(&self, id: SubscriberId) -> BroadcastResult<Option<SubscriberHandle<T>>> {
        debug!(subscriber = %id, "Broadcaster::unregister: called");
        let (request, reply) = UnregisterRequest::new(id);
        self.shared
            .unreg_tx
            .send(request)
            .await
            .map_err(|_| BroadcastError::Closed)?;
        reply.await.map_err(|_| BroadcastError::Closed)
    }

    /// Queue a message for fan-out, suspending while the input buffer is full
    ///
    /// On an unbuffered broadcaster (capacity 0) this returns once the
    /// coordinator has taken the message, as with a rendezvous channel.
    pub async fn submit(&self, message: T) -> BroadcastResult<()> {
        if !self.shared.rendezvous {
            return self
                .shared
                .input_tx
                .send(Envelope::new(message))
                .await
                .map_err(|_| BroadcastError::Closed);
        }

        let (envelope, taken) = Envelope::rendezvous(message);
        self.shared
            .input_tx
            .send(envelope)
            .await
            .map_err(|_| BroadcastError::Closed)?;
        taken.await.map_err(|_| BroadcastError::Closed)
    }

    /// Queue a message without waiting
    ///
    /// Returns false if the input buffer is full or the broadcaster is closed.
    /// An unbuffered broadcaster accepts only while the coordinator is idle and
    /// ready to take the message.
    pub fn try_submit(&self, message: T) -> bool {
        if self.shared.rendezvous && !self.claim_coordinator() {
            debug!("Broadcaster::try_submit: coordinator busy");
            return false;
        }

        match self.shared.input_tx.try_send(Envelope::new(message)) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!("Broadcaster::try_submit: input buffer full");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Queue a message from synchronous code, blocking the thread while the
    /// input buffer is full
    ///
    /// Panics if called from within an async execution context.
    pub fn blocking_submit(&self, message: T) -> BroadcastResult<()> {
        if !self.shared.rendezvous {
            return self
                .shared
                .input_tx
                .blocking_send(Envelope::new(message))
                .map_err(|_| BroadcastError::Closed);
        }

        let (envelope, taken) = Envelope::rendezvous(message);
        self.shared
            .input_tx
            .blocking_send(envelope)
            .map_err(|_| BroadcastError::Closed)?;
        taken.blocking_recv().map_err(|_| BroadcastError::Closed)
    }

    /// Shut the broadcaster down
    ///
    /// The teardown runs once no matter how many callers race here; every
    /// caller returns after it finished. Always `Ok`.
    pub async fn close(&self) -> BroadcastResult<()> {
        debug!("Broadcaster::close: called");
        self.shared.closed.get_or_init(|| self.teardown()).await;
        Ok(())
    }

    /// True once a `close` has completed
    pub fn is_closed(&self) -> bool {
        self.shared.closed.initialized()
    }

    /// Snapshot of the coordinator's counters
    pub fn metrics(&self) -> BroadcasterMetrics {
        self.shared.counters.snapshot()
    }

    /// Take the idle coordinator's next receive for one message
    fn claim_coordinator(&self) -> bool {
        self.shared
            .parked
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    async fn teardown(&self) {
        info!("Broadcaster shutting down");
        self.shared.stop.cancel();

        let task = self
            .shared
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(task) = task else {
            return;
        };

        match task.await {
            Ok((coordinator, reason)) => {
                let summary = coordinator.teardown();
                info!(
                    ?reason,
                    handles_closed = summary.handles_closed,
                    messages_discarded = summary.messages_discarded,
                    requests_discarded = summary.requests_discarded,
                    "Broadcaster closed"
                );
            }
            Err(e) => {
                // The task's state, handles included, was dropped with it
                warn!(error = %e, "Coordinator task failed before shutdown");
            }
        }
    }
}

/// Submission entry points, tolerant of an absent broadcaster
///
/// Implemented for [`Broadcaster`] and for `Option<B>`, where `None` makes
/// `submit` a no-op and `try_submit` return false.
#[async_trait]
pub trait Submit<T: Send + 'static>: Send + Sync {
    /// Queue a message, waiting for buffer space
    async fn submit(&self, message: T) -> BroadcastResult<()>;

    /// Queue a message without waiting
    fn try_submit(&self, message: T) -> bool;
}

#[async_trait]
impl<T: Clone + Send + 'static> Submit<T> for Broadcaster<T> {
    async fn submit(&self, message: T) -> BroadcastResult<()> {
        Broadcaster::submit(self, message).await
    }

    fn try_submit(&self, message: T) -> bool {
        Broadcaster::try_submit(self, message)
    }
}

#[async_trait]
impl<T, B> Submit<T> for Option<B>
where
    T: Send + 'static,
    B: Submit<T>,
{
    async fn submit(&self, message: T) -> BroadcastResult<()> {
        match self {
            Some(b) => b.submit(message).await,
            None => Ok(()),
        }
    }

    fn try_submit(&self, message: T) -> bool {
        match self {
            Some(b) => b.try_submit(message),
            None => false,
        }
    }
}
