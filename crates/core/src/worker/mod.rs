//! Worker pool draining the task topic.

mod config;
mod pool;

pub use config::WorkerConfig;
pub use pool::{WorkerPool, WorkerStats};
