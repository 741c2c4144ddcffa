//! Publisher and consumer seams.

use async_trait::async_trait;

use super::error::BrokerError;

/// Identifies a delivered message for acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckHandle {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}

/// A message handed out by [`TaskConsumer::poll`].
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Message key (the task id), when present.
    pub key: Option<String>,
    /// Serialized task envelope.
    pub payload: Vec<u8>,
    /// Pass back to [`TaskConsumer::commit`] once the work is done.
    pub ack: AckHandle,
}

/// Sends task envelopes to the topic.
#[async_trait]
pub trait TaskPublisher: Send + Sync {
    /// Publish one message. Returns once the broker has accepted it.
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), BrokerError>;
}

/// Reads task envelopes from the topic.
///
/// Messages that are never committed are delivered again to the next
/// consumer session, or to the current one once released.
#[async_trait]
pub trait TaskConsumer: Send + Sync {
    /// Wait for the next message. Must be cancel safe.
    async fn poll(&self) -> Result<Delivery, BrokerError>;

    /// Acknowledge a message as fully handled.
    async fn commit(&self, ack: &AckHandle) -> Result<(), BrokerError>;

    /// Give up on a message for now so a later poll hands it out again.
    /// Releasing an already committed message is a no-op.
    async fn release(&self, ack: &AckHandle) -> Result<(), BrokerError>;
}
