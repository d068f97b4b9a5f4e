//! Broadcaster configuration

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Broadcaster configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcasterConfig {
    /// Pending-input buffer size
    ///
    /// 0 is unbuffered: `submit` waits for the coordinator to take each
    /// message and `try_submit` succeeds only while the coordinator is idle.
    #[serde(rename = "buffer-capacity", default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Buffer size for subscriber channels created via [`BroadcasterConfig::subscriber`]
    #[serde(rename = "subscriber-capacity", default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

fn default_buffer_capacity() -> usize {
    debug!("default_buffer_capacity: called");
    1000
}

fn default_subscriber_capacity() -> usize {
    debug!("default_subscriber_capacity: called");
    100
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        debug!("BroadcasterConfig::default: called");
        Self {
            buffer_capacity: default_buffer_capacity(),
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}

impl BroadcasterConfig {
    /// Config with the given input buffer and default subscriber capacity
    pub fn with_buffer(buffer_capacity: usize) -> Self {
        Self {
            buffer_capacity,
            ..Default::default()
        }
    }

    /// Channel bound actually used for the pending-input queue
    pub(crate) fn input_bound(&self) -> usize {
        self.buffer_capacity.max(1)
    }

    /// Create a subscriber channel sized by `subscriber_capacity`
    pub fn subscriber<T>(&self) -> (crate::SubscriberHandle<T>, tokio::sync::mpsc::Receiver<T>) {
        crate::subscriber::channel(self.subscriber_capacity)
    }
}
