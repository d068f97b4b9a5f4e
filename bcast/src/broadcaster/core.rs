//! Coordinator task implementation
//!
//! The coordinator is the only code that touches the membership set. It waits
//! on the stop signal and the three queues at once, serving whichever is
//! ready, and runs each fan-out to completion (or until stopped) before it
//! looks at the queues again.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::messages::{Envelope, RegisterRequest, UnregisterRequest};
use super::metrics::Counters;
use crate::subscriber::{SubscriberHandle, SubscriberId};

/// Why the coordinator loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitReason {
    /// Stop signal raised by `close`
    Stopped,
    /// A queue's senders are all gone (every broadcaster handle dropped)
    QueueClosed(&'static str),
}

/// What the final teardown released
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Teardown {
    pub handles_closed: usize,
    pub messages_discarded: usize,
    pub requests_discarded: usize,
}

/// Serialized owner of the membership set
pub(crate) struct Coordinator<T> {
    input_rx: mpsc::Receiver<Envelope<T>>,
    reg_rx: mpsc::Receiver<RegisterRequest<T>>,
    unreg_rx: mpsc::Receiver<UnregisterRequest<T>>,
    stop: CancellationToken,
    members: HashMap<SubscriberId, SubscriberHandle<T>>,
    counters: Arc<Counters>,
    /// True only while the loop waits in `select!` with nothing in hand
    parked: Arc<AtomicBool>,
}

impl<T: Clone + Send + 'static> Coordinator<T> {
    pub(crate) fn new(
        input_rx: mpsc::Receiver<Envelope<T>>,
        reg_rx: mpsc::Receiver<RegisterRequest<T>>,
        unreg_rx: mpsc::Receiver<UnregisterRequest<T>>,
        stop: CancellationToken,
        counters: Arc<Counters>,
        parked: Arc<AtomicBool>,
    ) -> Self {
        Self {
            input_rx,
            reg_rx,
            unreg_rx,
            stop,
            members: HashMap::new(),
            counters,
            parked,
        }
    }

    /// Run until stopped or a queue closes, then hand the state back
    pub(crate) async fn run(mut self) -> (Self, ExitReason) {
        info!("Coordinator started");

        let reason = loop {
            self.parked.store(true, Ordering::Release);

            tokio::select! {
                _ = self.stop.cancelled() => break ExitReason::Stopped,

                envelope = self.input_rx.recv() => match envelope {
                    Some(Envelope { message, taken }) => {
                        self.unpark();
                        self.counters.received();
                        if let Some(taken) = taken {
                            let _ = taken.send(());
                        }
                        if !self.fan_out(message).await {
                            break ExitReason::Stopped;
                        }
                    }
                    None => break ExitReason::QueueClosed("input"),
                },

                request = self.reg_rx.recv() => match request {
                    Some(request) => {
                        self.unpark();
                        self.insert(request);
                    }
                    None => break ExitReason::QueueClosed("registration"),
                },

                request = self.unreg_rx.recv() => match request {
                    Some(request) => {
                        self.unpark();
                        self.remove(request);
                    }
                    None => break ExitReason::QueueClosed("unregistration"),
                },
            }
        };
        self.unpark();

        match reason {
            ExitReason::Stopped => info!(members = self.members.len(), "Coordinator stopped"),
            ExitReason::QueueClosed(queue) => {
                warn!(queue, members = self.members.len(), "Coordinator queue closed, stopping")
            }
        }
        (self, reason)
    }

    fn unpark(&self) {
        self.parked.store(false, Ordering::Release);
    }

    /// Deliver one message to every member
    ///
    /// Returns false if the stop signal preempted delivery; the members not yet
    /// reached never see this message.
    async fn fan_out(&mut self, message: T) -> bool {
        let mut gone = Vec::new();

        for (id, handle) in &self.members {
            tokio::select! {
                biased;

                _ = self.stop.cancelled() => {
                    debug!(subscriber = %id, "Fan-out abandoned by stop signal");
                    self.counters.fanout_abandoned();
                    return false;
                }

                sent = handle.send(message.clone()) => match sent {
                    Ok(()) => self.counters.delivered(),
                    Err(_) => gone.push(*id),
                },
            }
        }

        if !gone.is_empty() {
            self.prune(&gone);
        }
        self.counters.fanout_completed();
        true
    }

    fn insert(&mut self, request: RegisterRequest<T>) {
        let RegisterRequest { handle, ack } = request;
        let id = handle.id();
        debug!(subscriber = %id, "Registering subscriber");

        self.members.insert(id, handle);
        self.counters.registered();
        self.counters.set_subscribers(self.members.len());
        let _ = ack.send(id);
    }

    /// Remove a member and return its handle to the caller, open
    fn remove(&mut self, request: UnregisterRequest<T>) {
        let UnregisterRequest { id, reply } = request;
        let removed = self.members.remove(&id);

        if removed.is_some() {
            debug!(subscriber = %id, "Unregistering subscriber");
            self.counters.unregistered();
            self.counters.set_subscribers(self.members.len());
        } else {
            debug!(subscriber = %id, "Unregister for non-member ignored");
        }
        let _ = reply.send(removed);
    }

    /// Drop members whose receivers are gone
    fn prune(&mut self, gone: &[SubscriberId]) {
        for id in gone {
            if self.members.remove(id).is_some() {
                debug!(subscriber = %id, "Pruning subscriber with dropped receiver");
            }
        }
        self.counters.pruned(gone.len());
        self.counters.set_subscribers(self.members.len());
    }

    /// Close all three queues, then every handle still in the membership set
    pub(crate) fn teardown(mut self) -> Teardown {
        self.reg_rx.close();
        self.unreg_rx.close();
        self.input_rx.close();

        let mut summary = Teardown::default();

        // Requests that raced the shutdown: their handles close with them and
        // their callers see `Closed`.
        while self.reg_rx.try_recv().is_ok() {
            summary.requests_discarded += 1;
        }
        while self.unreg_rx.try_recv().is_ok() {
            summary.requests_discarded += 1;
        }
        while self.input_rx.try_recv().is_ok() {
            summary.messages_discarded += 1;
        }

        summary.handles_closed = self.members.len();
        for (id, handle) in self.members.drain() {
            debug!(subscriber = %id, "Closing subscriber handle");
            drop(handle);
        }
        self.counters.set_subscribers(0);

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber;
    use std::time::Duration;
    use tokio::task::JoinHandle;

    struct Harness {
        input_tx: mpsc::Sender<Envelope<u32>>,
        reg_tx: mpsc::Sender<RegisterRequest<u32>>,
        unreg_tx: mpsc::Sender<UnregisterRequest<u32>>,
        stop: CancellationToken,
        counters: Arc<Counters>,
        parked: Arc<AtomicBool>,
        task: JoinHandle<(Coordinator<u32>, ExitReason)>,
    }

    fn spawn_coordinator(buffer: usize) -> Harness {
        let (input_tx, input_rx) = mpsc::channel(buffer);
        let (reg_tx, reg_rx) = mpsc::channel(1);
        let (unreg_tx, unreg_rx) = mpsc::channel(1);
        let stop = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let parked = Arc::new(AtomicBool::new(false));

        let coord = Coordinator::new(
            input_rx,
            reg_rx,
            unreg_rx,
            stop.clone(),
            Arc::clone(&counters),
            Arc::clone(&parked),
        );
        let task = tokio::spawn(coord.run());

        Harness {
            input_tx,
            reg_tx,
            unreg_tx,
            stop,
            counters,
            parked,
            task,
        }
    }

    async fn register(h: &Harness, handle: SubscriberHandle<u32>) -> SubscriberId {
        let (req, ack) = RegisterRequest::new(handle);
        h.reg_tx.send(req).await.unwrap();
        ack.await.unwrap()
    }

    #[tokio::test]
    async fn test_coordinator_register_then_fan_out() {
        let h = spawn_coordinator(4);
        let (a, mut rx_a) = subscriber::channel(4);
        let (b, mut rx_b) = subscriber::channel(4);
        register(&h, a).await;
        register(&h, b).await;

        h.input_tx.send(Envelope::new(1)).await.unwrap();
        h.input_tx.send(Envelope::new(2)).await.unwrap();

        assert_eq!(rx_a.recv().await, Some(1));
        assert_eq!(rx_a.recv().await, Some(2));
        assert_eq!(rx_b.recv().await, Some(1));
        assert_eq!(rx_b.recv().await, Some(2));

        h.stop.cancel();
        let (_, reason) = h.task.await.unwrap();
        assert_eq!(reason, ExitReason::Stopped);
    }

    #[tokio::test]
    async fn test_coordinator_unregister_returns_open_handle() {
        let h = spawn_coordinator(4);
        let (a, mut rx_a) = subscriber::channel(4);
        let id = register(&h, a).await;

        let (req, reply) = UnregisterRequest::new(id);
        h.unreg_tx.send(req).await.unwrap();
        let handle = reply.await.unwrap().expect("member handle");
        assert_eq!(handle.id(), id);
        assert!(!handle.is_closed());

        // Still usable by its owner
        handle.send(9).await.unwrap();
        assert_eq!(rx_a.recv().await, Some(9));

        let (req, reply) = UnregisterRequest::new(id);
        h.unreg_tx.send(req).await.unwrap();
        assert!(reply.await.unwrap().is_none());

        assert_eq!(h.counters.snapshot().unregistrations, 1);
        h.stop.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_coordinator_prunes_dropped_subscriber() {
        let h = spawn_coordinator(4);
        let (a, rx_a) = subscriber::channel(4);
        let (b, mut rx_b) = subscriber::channel(4);
        register(&h, a).await;
        register(&h, b).await;
        drop(rx_a);

        h.input_tx.send(Envelope::new(5)).await.unwrap();
        assert_eq!(rx_b.recv().await, Some(5));

        // Give coordinator time to finish the fan-out step
        tokio::time::sleep(Duration::from_millis(50)).await;
        let m = h.counters.snapshot();
        assert_eq!(m.subscribers_pruned, 1);
        assert_eq!(m.subscribers, 1);

        h.stop.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_coordinator_stop_preempts_blocked_fan_out() {
        let h = spawn_coordinator(4);
        let (slow, mut rx_slow) = subscriber::channel(1);
        register(&h, slow).await;

        h.input_tx.send(Envelope::new(1)).await.unwrap();
        h.input_tx.send(Envelope::new(2)).await.unwrap();

        // Second delivery blocks on the full subscriber buffer
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.stop.cancel();

        let (coord, reason) = tokio::time::timeout(Duration::from_secs(1), h.task)
            .await
            .expect("coordinator should stop")
            .unwrap();
        assert_eq!(reason, ExitReason::Stopped);
        assert_eq!(h.counters.snapshot().fanouts_abandoned, 1);

        let summary = coord.teardown();
        assert_eq!(summary.handles_closed, 1);
        assert_eq!(rx_slow.recv().await, Some(1));
        assert_eq!(rx_slow.recv().await, None);
    }

    #[tokio::test]
    async fn test_coordinator_exits_when_senders_dropped() {
        let h = spawn_coordinator(4);
        let (a, mut rx_a) = subscriber::channel(4);
        register(&h, a).await;

        drop(h.input_tx);
        drop(h.reg_tx);
        drop(h.unreg_tx);

        let (coord, reason) = h.task.await.unwrap();
        assert!(matches!(reason, ExitReason::QueueClosed(_)));
        drop(coord);
        assert_eq!(rx_a.recv().await, None);
    }

    #[tokio::test]
    async fn test_rendezvous_acked_on_dequeue() {
        let h = spawn_coordinator(1);
        let (slow, mut rx_slow) = subscriber::channel(1);
        register(&h, slow).await;

        let (first, taken_first) = Envelope::rendezvous(1);
        h.input_tx.send(first).await.unwrap();
        taken_first.await.unwrap();

        // Taken even though its delivery is stuck behind the full subscriber
        let (second, taken_second) = Envelope::rendezvous(2);
        h.input_tx.send(second).await.unwrap();
        taken_second.await.unwrap();
        assert_eq!(h.counters.snapshot().messages_received, 2);

        assert_eq!(rx_slow.recv().await, Some(1));
        assert_eq!(rx_slow.recv().await, Some(2));
        h.stop.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_parked_only_while_idle() {
        let h = spawn_coordinator(1);
        let (slow, mut rx_slow) = subscriber::channel(1);
        register(&h, slow).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.parked.load(Ordering::Acquire));

        h.input_tx.send(Envelope::new(1)).await.unwrap();
        h.input_tx.send(Envelope::new(2)).await.unwrap();

        // Delivering 2 blocks on the full subscriber buffer
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!h.parked.load(Ordering::Acquire));

        assert_eq!(rx_slow.recv().await, Some(1));
        assert_eq!(rx_slow.recv().await, Some(2));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.parked.load(Ordering::Acquire));

        h.stop.cancel();
        h.task.await.unwrap();
        assert!(!h.parked.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn test_teardown_discards_pending_input() {
        let h = spawn_coordinator(8);
        h.stop.cancel();
        let (coord, _) = h.task.await.unwrap();

        h.input_tx.send(Envelope::new(1)).await.unwrap();
        h.input_tx.send(Envelope::new(2)).await.unwrap();

        let summary = coord.teardown();
        assert_eq!(summary.messages_discarded, 2);
        assert_eq!(summary.handles_closed, 0);
        assert!(h.input_tx.send(Envelope::new(3)).await.is_err());
        assert!(h.reg_tx.is_closed());
    }
}
