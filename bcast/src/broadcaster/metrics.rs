//! Coordinator counters
//!
//! Only the coordinator task writes these; readers take a relaxed snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time broadcaster metrics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BroadcasterMetrics {
    pub subscribers: u64,
    pub registrations: u64,
    pub unregistrations: u64,
    pub messages_received: u64,
    pub deliveries: u64,
    pub fanouts_completed: u64,
    pub fanouts_abandoned: u64,
    pub subscribers_pruned: u64,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    subscribers: AtomicU64,
    registrations: AtomicU64,
    unregistrations: AtomicU64,
    messages_received: AtomicU64,
    deliveries: AtomicU64,
    fanouts_completed: AtomicU64,
    fanouts_abandoned: AtomicU64,
    subscribers_pruned: AtomicU64,
}

impl Counters {
    pub(crate) fn set_subscribers(&self, n: usize) {
        self.subscribers.store(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn registered(&self) {
        self.registrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn unregistered(&self) {
        self.unregistrations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delivered(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn pruned(&self, n: usize) {
        self.subscribers_pruned.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn fanout_completed(&self) {
        // Release pairs with the Acquire in snapshot so a reader that sees the
        // completion also sees its deliveries.
        self.fanouts_completed.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn fanout_abandoned(&self) {
        self.fanouts_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BroadcasterMetrics {
        let fanouts_completed = self.fanouts_completed.load(Ordering::Acquire);
        BroadcasterMetrics {
            subscribers: self.subscribers.load(Ordering::Relaxed),
            registrations: self.registrations.load(Ordering::Relaxed),
            unregistrations: self.unregistrations.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            fanouts_completed,
            fanouts_abandoned: self.fanouts_abandoned.load(Ordering::Relaxed),
            subscribers_pruned: self.subscribers_pruned.load(Ordering::Relaxed),
        }
    }
}
