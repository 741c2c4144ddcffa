use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::path::PathBuf;

use crate::broker::RetryPolicy;
use crate::orchestrator::RecoveryConfig;
use crate::task::DEFAULT_MAX_RESIZE_SIDE;
use crate::worker::WorkerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub formats: FormatsConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted upload body, in bytes.
    #[serde(default = "default_max_upload")]
    pub max_upload_bytes: usize,
    /// Largest accepted resize width or height, in pixels.
    #[serde(default = "default_max_resize_side")]
    pub max_resize_side: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_upload_bytes: default_max_upload(),
            max_resize_side: default_max_resize_side(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

fn default_max_upload() -> usize {
    20 * 1024 * 1024
}

fn default_max_resize_side() -> u32 {
    DEFAULT_MAX_RESIZE_SIDE
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("imgpipe.db")
}

/// Input and output file areas
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Uploaded originals.
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    /// Transform results.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_input_dir() -> PathBuf {
    PathBuf::from("storage/input")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("storage/output")
}

/// Accepted upload formats
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FormatsConfig {
    #[serde(default = "default_formats")]
    pub supported: Vec<String>,
}

impl Default for FormatsConfig {
    fn default() -> Self {
        Self {
            supported: default_formats(),
        }
    }
}

impl FormatsConfig {
    /// Lower-cased whitelist.
    pub fn to_set(&self) -> HashSet<String> {
        self.supported.iter().map(|f| f.to_lowercase()).collect()
    }
}

fn default_formats() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Message broker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// Broker implementation
    #[serde(default)]
    pub backend: BrokerBackend,
    /// Topic carrying task envelopes
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Kafka-specific configuration (required when backend = "kafka")
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: BrokerBackend::default(),
            topic: default_topic(),
            kafka: None,
        }
    }
}

fn default_topic() -> String {
    "image-tasks".to_string()
}

/// Available broker backends
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BrokerBackend {
    /// In-process log; single node only.
    #[default]
    Memory,
    /// Kafka consumer group (needs the `kafka` feature).
    Kafka,
}

/// Kafka connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct KafkaConfig {
    /// Bootstrap servers, e.g. "localhost:9092"
    pub brokers: String,
    /// Consumer group id
    #[serde(default = "default_group_id")]
    pub group_id: String,
    /// Producer delivery timeout in seconds (default: 10)
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
}

fn default_group_id() -> String {
    "imgpipe-workers".to_string()
}

fn default_send_timeout() -> u64 {
    10
}
