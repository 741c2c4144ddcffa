//! Kafka-backed publisher and consumer (`kafka` feature).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::{ClientConfig, Offset, TopicPartitionList};
use tracing::{debug, info};

use super::error::BrokerError;
use super::traits::{AckHandle, Delivery, TaskConsumer, TaskPublisher};
use crate::config::KafkaConfig;

/// Publishes task envelopes with `acks=all`.
pub struct KafkaPublisher {
    producer: FutureProducer,
    topic: String,
    send_timeout: Duration,
}

impl KafkaPublisher {
    pub fn new(config: &KafkaConfig, topic: &str) -> Result<Self, BrokerError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("acks", "all")
            .set("message.timeout.ms", (config.send_timeout_secs * 1000).to_string())
            .create()
            .map_err(|e| BrokerError::Unavailable(format!("Failed to create producer: {}", e)))?;

        info!(brokers = %config.brokers, topic, "Kafka publisher initialized");

        Ok(Self {
            producer,
            topic: topic.to_string(),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
        })
    }
}

#[async_trait]
impl TaskPublisher for KafkaPublisher {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let record = FutureRecord::to(&self.topic).key(key).payload(payload);

        let (partition, offset) = self
            .producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(e, _)| BrokerError::Publish(e.to_string()))?;

        debug!(topic = %self.topic, key, partition, offset, "Published message");
        Ok(())
    }
}

/// Kafka stores the position of the next message to read.
fn commit_position(ack: &AckHandle) -> Result<TopicPartitionList, BrokerError> {
    let mut tpl = TopicPartitionList::new();
    tpl.add_partition_offset(&ack.topic, ack.partition, Offset::Offset(ack.offset + 1))
        .map_err(|e| BrokerError::Commit(e.to_string()))?;
    Ok(tpl)
}

/// How long a seek may block before it is reported as failed.
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// Group consumer with manual, synchronous offset commits.
///
/// Commits and seeks block on the broker, so they run on the blocking pool.
pub struct KafkaConsumer {
    consumer: Arc<StreamConsumer>,
}

impl KafkaConsumer {
    pub fn new(config: &KafkaConfig, topic: &str) -> Result<Self, BrokerError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "45000")
            .create()
            .map_err(|e| BrokerError::Unavailable(format!("Failed to create consumer: {}", e)))?;

        consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::Unavailable(format!("Failed to subscribe: {}", e)))?;

        info!(
            brokers = %config.brokers,
            topic,
            group_id = %config.group_id,
            "Kafka consumer initialized"
        );

        Ok(Self {
            consumer: Arc::new(consumer),
        })
    }
}

#[async_trait]
impl TaskConsumer for KafkaConsumer {
    async fn poll(&self) -> Result<Delivery, BrokerError> {
        let msg = self
            .consumer
            .recv()
            .await
            .map_err(|e| BrokerError::Poll(e.to_string()))?;

        Ok(Delivery {
            key: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            ack: AckHandle {
                topic: msg.topic().to_string(),
                partition: msg.partition(),
                offset: msg.offset(),
            },
        })
    }

    async fn commit(&self, ack: &AckHandle) -> Result<(), BrokerError> {
        let tpl = commit_position(ack)?;

        // Sync: Ok means the group coordinator has stored the offset.
        let consumer = Arc::clone(&self.consumer);
        tokio::task::spawn_blocking(move || consumer.commit(&tpl, CommitMode::Sync))
            .await
            .map_err(|e| BrokerError::Commit(e.to_string()))?
            .map_err(|e| BrokerError::Commit(e.to_string()))?;

        debug!(topic = %ack.topic, partition = ack.partition, offset = ack.offset, "Committed offset");
        Ok(())
    }

    /// Rewinds the partition to the released message. Later messages on the
    /// same partition are fetched again too.
    async fn release(&self, ack: &AckHandle) -> Result<(), BrokerError> {
        let consumer = Arc::clone(&self.consumer);
        let (topic, partition, offset) = (ack.topic.clone(), ack.partition, ack.offset);
        tokio::task::spawn_blocking(move || {
            consumer.seek(&topic, partition, Offset::Offset(offset), SEEK_TIMEOUT)
        })
        .await
        .map_err(|e| BrokerError::Release(e.to_string()))?
        .map_err(|e| BrokerError::Release(e.to_string()))?;

        debug!(topic = %ack.topic, partition = ack.partition, offset = ack.offset, "Rewound partition");
        Ok(())
    }
}
