//! bcast - in-process publish/subscribe broadcaster
//!
//! Producers submit messages into a [`Broadcaster`]; subscribers register a
//! send-only [`SubscriberHandle`] and receive every message submitted while
//! they are registered. A single coordinator task owns the membership set and
//! performs every fan-out, so no locks guard subscriber state.
//!
//! # Architecture
//!
//! ```text
//!   Producers                                   Subscribers
//!   submit / try_submit                         register / unregister
//!        │                                           │
//!        ▼                                           ▼
//!   [input queue]            [register queue] [unregister queue]
//!        │                          │                │
//!        └──────────────┬───────────┴────────────────┘
//!                       ▼
//!              ┌─────────────────┐      stop signal (close)
//!              │   Coordinator   │◄──────────────────────
//!              │ (membership set)│
//!              └────────┬────────┘
//!          fan-out      │
//!        ┌──────────────┼──────────────┐
//!        ▼              ▼              ▼
//!     handle A       handle B       handle N
//! ```
//!
//! # Example
//!
//! ```no_run
//! use bcast::{Broadcaster, subscriber};
//!
//! # async fn demo() -> Result<(), bcast::BroadcastError> {
//! let broadcaster = Broadcaster::new(16);
//! let (handle, mut rx) = subscriber::channel(16);
//! broadcaster.register(handle).await?;
//!
//! broadcaster.submit("deploy finished").await?;
//! assert_eq!(rx.recv().await, Some("deploy finished"));
//!
//! broadcaster.close().await?;
//! assert_eq!(rx.recv().await, None);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`broadcaster`] - coordinator, gateways and shutdown
//! - [`subscriber`] - subscriber handles
//! - [`drill`] - end-to-end fan-out drill
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod broadcaster;
pub mod cli;
pub mod config;
pub mod drill;
pub mod error;
pub mod subscriber;

// Re-export commonly used types
pub use broadcaster::{Broadcaster, BroadcasterConfig, BroadcasterMetrics, Submit};
pub use config::Config;
pub use drill::{DrillOptions, DrillReport, run_drill};
pub use error::{BroadcastError, BroadcastResult};
pub use subscriber::{SubscriberHandle, SubscriberId};
