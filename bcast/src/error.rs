//! Broadcaster error types

use thiserror::Error;

/// Errors returned by broadcaster operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BroadcastError {
    /// The broadcaster was closed (or its coordinator is gone) before the
    /// request could be handed off
    #[error("Broadcaster closed")]
    Closed,
}

/// Result alias for broadcaster operations
pub type BroadcastResult<T> = Result<T, BroadcastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_message() {
        assert_eq!(BroadcastError::Closed.to_string(), "Broadcaster closed");
    }
}
