//! Broadcaster: one coordinator task fanning messages out to subscribers
//!
//! All membership state lives inside the coordinator task. Callers reach it
//! only through three queues plus a stop signal:
//! - **Input:** messages awaiting fan-out (bounded by `buffer_capacity`)
//! - **Register / Unregister:** membership changes, acknowledged by the coordinator
//! - **Stop:** raised once by `close`, preempting any in-flight fan-out

mod config;
mod core;
mod handle;
mod messages;
mod metrics;

pub use config::BroadcasterConfig;
pub use handle::{Broadcaster, Submit};
pub use metrics::BroadcasterMetrics;
