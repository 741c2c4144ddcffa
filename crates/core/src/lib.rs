pub mod broker;
pub mod config;
pub mod files;
pub mod metrics;
pub mod orchestrator;
pub mod task;
pub mod testing;
pub mod transform;
pub mod worker;

pub use broker::{
    spawn_poll_loop, AckHandle, BrokerError, Delivery, InMemoryBroker, InMemoryConsumer,
    RetryPolicy, TaskConsumer, TaskPublisher,
};
#[cfg(feature = "kafka")]
pub use broker::{KafkaConsumer, KafkaPublisher};
pub use config::{
    load_config, load_config_from_str, validate_config, BrokerBackend, Config, ConfigError,
};
pub use files::{FileArea, FileError, LocalFileArea};
pub use orchestrator::{
    format_from_filename, spawn_recovery_loop, ImageService, ImageView, RecoveryConfig,
    RecoverySummary, ServiceError,
};
pub use task::{NewTask, Resize, SqliteTaskStore, Task, TaskError, TaskStatus, TaskStore};
pub use transform::{transform, TransformError, TransformOutput, TransformRequest};
pub use worker::{WorkerConfig, WorkerPool, WorkerStats};
