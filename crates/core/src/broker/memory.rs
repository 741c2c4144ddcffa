//! In-process broker used by the default build and by tests.
//!
//! Messages live in an append-only log. Each record carries its own
//! acknowledgement flag, and a consumer session starts at the first
//! unacknowledged record, so a fresh session after a crash sees every
//! message that was never committed. Within a session, a released record is
//! handed out again ahead of new ones.
//!
//! Acknowledged records at the head of the log are dropped. Offsets stay
//! stable: `base` is the offset of the oldest record still held.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};
use tracing::debug;

use super::error::BrokerError;
use super::traits::{AckHandle, Delivery, TaskConsumer, TaskPublisher};

const PARTITION: i32 = 0;

#[derive(Debug, Clone)]
struct Record {
    key: String,
    payload: Vec<u8>,
    acked: bool,
}

#[derive(Debug, Default)]
struct LogState {
    base: u64,
    records: VecDeque<Record>,
    published: u64,
    fail_publishes: u32,
    fail_polls: u32,
}

impl LogState {
    /// Offset the next published record will get.
    fn end(&self) -> u64 {
        self.base + self.records.len() as u64
    }

    fn get(&self, offset: u64) -> Option<&Record> {
        let index = usize::try_from(offset.checked_sub(self.base)?).ok()?;
        self.records.get(index)
    }

    fn get_mut(&mut self, offset: u64) -> Option<&mut Record> {
        let index = usize::try_from(offset.checked_sub(self.base)?).ok()?;
        self.records.get_mut(index)
    }

    fn first_unacked(&self) -> u64 {
        self.records
            .iter()
            .position(|r| !r.acked)
            .map_or(self.end(), |i| self.base + i as u64)
    }

    fn compact(&mut self) {
        while self.records.front().is_some_and(|r| r.acked) {
            self.records.pop_front();
            self.base += 1;
        }
    }
}

fn to_offset(ack: &AckHandle) -> Option<u64> {
    u64::try_from(ack.offset).ok()
}

/// A single-topic, single-partition message log.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    topic: String,
    state: Arc<Mutex<LogState>>,
    /// Bumped on every publish or release to wake waiting consumers.
    changes: Arc<watch::Sender<u64>>,
}

impl InMemoryBroker {
    pub fn new(topic: impl Into<String>) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            topic: topic.into(),
            state: Arc::new(Mutex::new(LogState::default())),
            changes: Arc::new(changes),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Open a consumer session positioned at the first uncommitted record.
    pub async fn consumer(&self) -> InMemoryConsumer {
        let cursor = self.state.lock().await.first_unacked();

        InMemoryConsumer {
            broker: self.clone(),
            session: Mutex::new(Session {
                cursor,
                released: VecDeque::new(),
            }),
        }
    }

    /// Make the next `n` publishes fail.
    pub async fn fail_next_publishes(&self, n: u32) {
        self.state.lock().await.fail_publishes = n;
    }

    /// Make the next `n` polls fail.
    pub async fn fail_next_polls(&self, n: u32) {
        self.state.lock().await.fail_polls = n;
    }

    /// Records still held in the log.
    pub async fn len(&self) -> usize {
        self.state.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Records ever published, including compacted ones.
    pub async fn published(&self) -> u64 {
        self.state.lock().await.published
    }

    /// Records not yet committed.
    pub async fn uncommitted(&self) -> usize {
        self.state
            .lock()
            .await
            .records
            .iter()
            .filter(|r| !r.acked)
            .count()
    }

    /// Keys of the records still held, in publish order.
    pub async fn published_keys(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .records
            .iter()
            .map(|r| r.key.clone())
            .collect()
    }

    pub async fn is_committed(&self, offset: i64) -> bool {
        let state = self.state.lock().await;
        match u64::try_from(offset) {
            Ok(offset) if offset < state.base => true,
            Ok(offset) => state.get(offset).is_some_and(|r| r.acked),
            Err(_) => false,
        }
    }

    fn notify(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new("image-tasks")
    }
}

#[async_trait]
impl TaskPublisher for InMemoryBroker {
    async fn publish(&self, key: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let offset = {
            let mut state = self.state.lock().await;
            if state.fail_publishes > 0 {
                state.fail_publishes -= 1;
                return Err(BrokerError::Publish("injected publish failure".to_string()));
            }
            let offset = state.end();
            state.records.push_back(Record {
                key: key.to_string(),
                payload: payload.to_vec(),
                acked: false,
            });
            state.published += 1;
            offset
        };

        debug!(topic = %self.topic, key, offset, "Published message");
        self.notify();
        Ok(())
    }
}

#[derive(Debug)]
struct Session {
    /// Next offset never handed out by this session.
    cursor: u64,
    /// Offsets handed back through `release`, in release order.
    released: VecDeque<u64>,
}

/// One consumer session over an [`InMemoryBroker`].
#[derive(Debug)]
pub struct InMemoryConsumer {
    broker: InMemoryBroker,
    session: Mutex<Session>,
}

impl InMemoryConsumer {
    fn delivery(&self, offset: u64, record: &Record) -> Delivery {
        Delivery {
            key: Some(record.key.clone()),
            payload: record.payload.clone(),
            ack: AckHandle {
                topic: self.broker.topic.clone(),
                partition: PARTITION,
                offset: offset as i64,
            },
        }
    }

    /// Released records first, then the next unacknowledged record at or
    /// after the cursor.
    async fn try_next(&self) -> Result<Option<Delivery>, BrokerError> {
        let mut state = self.broker.state.lock().await;
        if state.fail_polls > 0 {
            state.fail_polls -= 1;
            return Err(BrokerError::Poll("injected poll failure".to_string()));
        }

        let mut session = self.session.lock().await;
        while let Some(offset) = session.released.pop_front() {
            if let Some(record) = state.get(offset).filter(|r| !r.acked) {
                return Ok(Some(self.delivery(offset, record)));
            }
        }

        session.cursor = session.cursor.max(state.base);
        while session.cursor < state.end() {
            let offset = session.cursor;
            session.cursor += 1;

            if let Some(record) = state.get(offset).filter(|r| !r.acked) {
                return Ok(Some(self.delivery(offset, record)));
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl TaskConsumer for InMemoryConsumer {
    async fn poll(&self) -> Result<Delivery, BrokerError> {
        loop {
            // Subscribe before looking so a publish in between is not missed.
            let mut rx = self.broker.changes.subscribe();

            if let Some(delivery) = self.try_next().await? {
                return Ok(delivery);
            }

            if rx.changed().await.is_err() {
                return Err(BrokerError::Unavailable("broker dropped".to_string()));
            }
        }
    }

    async fn commit(&self, ack: &AckHandle) -> Result<(), BrokerError> {
        let mut state = self.broker.state.lock().await;
        let end = state.end();
        let offset = to_offset(ack)
            .filter(|o| *o < end)
            .ok_or_else(|| BrokerError::Commit(format!("unknown offset {}", ack.offset)))?;

        // Below `base` the record was committed and dropped already.
        if let Some(record) = state.get_mut(offset) {
            record.acked = true;
            record.payload = Vec::new();
        }
        state.compact();

        debug!(topic = %ack.topic, offset = ack.offset, base = state.base, "Committed message");
        Ok(())
    }

    async fn release(&self, ack: &AckHandle) -> Result<(), BrokerError> {
        {
            let state = self.broker.state.lock().await;
            let end = state.end();
            let offset = to_offset(ack)
                .filter(|o| *o < end)
                .ok_or_else(|| BrokerError::Release(format!("unknown offset {}", ack.offset)))?;

            if !state.get(offset).is_some_and(|r| !r.acked) {
                return Ok(());
            }
            self.session.lock().await.released.push_back(offset);
        }

        debug!(topic = %ack.topic, offset = ack.offset, "Released message");
        self.broker.notify();
        Ok(())
    }
}
