//! Error types for the broker module.

use thiserror::Error;

/// Errors raised by publishers and consumers.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Could not reach or configure the broker.
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// Publishing a message failed.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Receiving the next message failed.
    #[error("Poll failed: {0}")]
    Poll(String),

    /// Acknowledging a message failed.
    #[error("Commit failed: {0}")]
    Commit(String),

    /// Handing a message back for redelivery failed.
    #[error("Release failed: {0}")]
    Release(String),
}
