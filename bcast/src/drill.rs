//! Fan-out drill
//!
//! Runs producers and subscribers against a real broadcaster and checks what
//! each subscriber saw. Used by `bcast drill` and as an end-to-end smoke test.

use std::time::{Duration, Instant};

use eyre::{Context, Result};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::broadcaster::{Broadcaster, BroadcasterConfig, BroadcasterMetrics};

/// Drill parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrillOptions {
    /// Concurrent producer tasks
    pub producers: usize,

    /// Registered subscribers
    pub subscribers: usize,

    /// Messages each producer submits
    #[serde(rename = "messages-per-producer")]
    pub messages_per_producer: u64,

    /// Per-message processing delay for every subscriber (simulates slow consumers)
    #[serde(rename = "subscriber-delay-ms")]
    pub subscriber_delay_ms: u64,

    /// Use `try_submit` instead of `submit` (rejections are counted, not retried)
    #[serde(rename = "try-submit")]
    pub try_submit: bool,

    /// How long to wait for accepted messages to be fanned out before closing
    #[serde(rename = "drain-timeout-secs")]
    pub drain_timeout_secs: u64,
}

impl Default for DrillOptions {
    fn default() -> Self {
        Self {
            producers: 4,
            subscribers: 8,
            messages_per_producer: 1000,
            subscriber_delay_ms: 0,
            try_submit: false,
            drain_timeout_secs: 30,
        }
    }
}

/// Outcome of a drill
#[derive(Debug, Clone, Serialize)]
pub struct DrillReport {
    pub producers: usize,
    pub subscribers: usize,
    /// Messages the broadcaster accepted
    pub submitted: u64,
    /// `try_submit` calls that found the buffer full
    pub rejected: u64,
    /// Messages received, per subscriber
    pub received: Vec<u64>,
    /// Every subscriber saw each producer's messages in submission order
    pub in_order: bool,
    /// Every subscriber received every accepted message
    pub complete: bool,
    pub elapsed_ms: u64,
    pub metrics: BroadcasterMetrics,
}

#[derive(Debug, Clone, Copy)]
struct Tick {
    producer: usize,
    seq: u64,
}

#[derive(Debug, Default)]
struct Tally {
    received: u64,
    in_order: bool,
}

/// Run one drill to completion
pub async fn run_drill(config: &BroadcasterConfig, options: &DrillOptions) -> Result<DrillReport> {
    info!(?config, ?options, "run_drill: starting");
    let started = Instant::now();
    let broadcaster: Broadcaster<Tick> = Broadcaster::with_config(config);
    let delay = Duration::from_millis(options.subscriber_delay_ms);

    let mut consumers = Vec::with_capacity(options.subscribers);
    for _ in 0..options.subscribers {
        let (handle, rx) = config.subscriber();
        broadcaster
            .register(handle)
            .await
            .context("Failed to register drill subscriber")?;
        consumers.push(tokio::spawn(consume(rx, options.producers, delay)));
    }

    let producers = (0..options.producers).map(|producer| {
        let broadcaster = broadcaster.clone();
        let count = options.messages_per_producer;
        let try_submit = options.try_submit;
        tokio::spawn(async move { produce(broadcaster, producer, count, try_submit).await })
    });

    let mut submitted = 0;
    let mut rejected = 0;
    for outcome in join_all(producers).await {
        let (accepted, refused) = outcome.context("Drill producer panicked")??;
        submitted += accepted;
        rejected += refused;
    }
    debug!(submitted, rejected, "run_drill: producers finished");

    // close() preempts delivery, so let the accepted messages fan out first
    let drain = Duration::from_secs(options.drain_timeout_secs);
    let drained = tokio::time::timeout(drain, async {
        while broadcaster.metrics().fanouts_completed < submitted {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .is_ok();
    if !drained {
        warn!(?drain, "run_drill: fan-out did not drain before timeout, closing anyway");
    }

    broadcaster.close().await?;

    let mut received = Vec::with_capacity(consumers.len());
    let mut in_order = true;
    for tally in join_all(consumers).await {
        let tally = tally.context("Drill subscriber panicked")?;
        received.push(tally.received);
        in_order &= tally.in_order;
    }
    let complete = received.iter().all(|&n| n == submitted);

    let report = DrillReport {
        producers: options.producers,
        subscribers: options.subscribers,
        submitted,
        rejected,
        received,
        in_order,
        complete,
        elapsed_ms: started.elapsed().as_millis() as u64,
        metrics: broadcaster.metrics(),
    };
    info!(submitted, rejected, complete, in_order, "run_drill: finished");
    Ok(report)
}

async fn produce(broadcaster: Broadcaster<Tick>, producer: usize, count: u64, try_submit: bool) -> Result<(u64, u64)> {
    let mut accepted = 0;
    let mut refused = 0;
    for seq in 0..count {
        let tick = Tick { producer, seq };
        if try_submit {
            if broadcaster.try_submit(tick) {
                accepted += 1;
            } else {
                refused += 1;
                tokio::task::yield_now().await;
            }
        } else {
            broadcaster.submit(tick).await?;
            accepted += 1;
        }
    }
    Ok((accepted, refused))
}

/// Drain a subscriber until the broadcaster closes it
async fn consume(mut rx: mpsc::Receiver<Tick>, producers: usize, delay: Duration) -> Tally {
    let mut last: Vec<Option<u64>> = vec![None; producers];
    let mut tally = Tally {
        in_order: true,
        ..Default::default()
    };

    while let Some(tick) = rx.recv().await {
        tally.received += 1;
        if let Some(slot) = last.get_mut(tick.producer) {
            if slot.is_some_and(|prev| tick.seq <= prev) {
                tally.in_order = false;
            }
            *slot = Some(tick.seq);
        }
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
    tally
}
