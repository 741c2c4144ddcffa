//! Message broker contract.
//!
//! Task envelopes travel through a single topic. Publishers are used by the
//! intake path and backlog recovery; one consumer session per process feeds
//! the worker pool through [`spawn_poll_loop`]. Delivery is at-least-once:
//! a message is committed only after its output is written and the task is
//! marked processed.

mod error;
#[cfg(feature = "kafka")]
mod kafka;
mod memory;
mod poller;
mod retry;
mod traits;

pub use error::BrokerError;
#[cfg(feature = "kafka")]
pub use kafka::{KafkaConsumer, KafkaPublisher};
pub use memory::{InMemoryBroker, InMemoryConsumer};
pub use poller::spawn_poll_loop;
pub use retry::RetryPolicy;
pub use traits::{AckHandle, Delivery, TaskConsumer, TaskPublisher};
