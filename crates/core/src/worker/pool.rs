//! Fixed-size worker pool draining the task topic.
//!
//! One poll loop feeds a bounded channel; `count` workers share its
//! receiving end. A message is committed only after the output file is
//! written and the task is marked processed. Any failure before that leaves
//! the message uncommitted and, after `redelivery_delay_ms`, releases it
//! back to the consumer for another attempt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::WorkerConfig;
use crate::broker::{spawn_poll_loop, AckHandle, Delivery, RetryPolicy, TaskConsumer};
use crate::files::FileArea;
use crate::metrics;
use crate::task::{Task, TaskError, TaskStatus, TaskStore};
use crate::transform::{transform_blocking, TransformError, TransformRequest};

/// Counters shared by all workers.
#[derive(Debug, Default)]
pub struct WorkerStats {
    processed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    dead_lettered: AtomicU64,
    committed: AtomicU64,
}

impl WorkerStats {
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn dead_lettered(&self) -> u64 {
        self.dead_lettered.load(Ordering::Relaxed)
    }

    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }
}

/// How one message ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Processed,
    /// Task deleted, dead, or unknown. Committed without work.
    Skipped,
    /// Delivery cap exceeded. Task marked failed and committed.
    DeadLettered,
    /// Left uncommitted and released for another attempt.
    Failed(&'static str),
    /// Names no task, so no attempt can succeed. Left uncommitted.
    Unreadable,
}

/// Everything a worker needs to run one task.
struct Worker {
    id: usize,
    config: WorkerConfig,
    consumer: Arc<dyn TaskConsumer>,
    store: Arc<dyn TaskStore>,
    files: Arc<dyn FileArea>,
    stats: Arc<WorkerStats>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(self, receiver: Arc<Mutex<mpsc::Receiver<Delivery>>>) {
        let mut shutdown = self.shutdown.clone();
        debug!(worker = self.id, "Worker started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let next = tokio::select! {
                _ = shutdown.changed() => None,
                delivery = async { receiver.lock().await.recv().await } => delivery,
            };

            let Some(delivery) = next else {
                break;
            };

            // Not cancelled mid-task: shutdown waits for this to finish.
            let ack = delivery.ack.clone();
            let outcome = self.handle(delivery).await;
            self.record(outcome);
            if matches!(outcome, Outcome::Failed(_)) {
                self.schedule_release(ack);
            }
        }
        debug!(worker = self.id, "Worker stopped");
    }

    fn record(&self, outcome: Outcome) {
        match outcome {
            Outcome::Processed => {
                self.stats.processed.fetch_add(1, Ordering::Relaxed);
                metrics::TASKS_TOTAL.with_label_values(&["processed"]).inc();
            }
            Outcome::Skipped => {
                self.stats.skipped.fetch_add(1, Ordering::Relaxed);
                metrics::TASKS_TOTAL.with_label_values(&["skipped"]).inc();
            }
            Outcome::DeadLettered => {
                self.stats.dead_lettered.fetch_add(1, Ordering::Relaxed);
                metrics::TASKS_TOTAL.with_label_values(&["dead_lettered"]).inc();
            }
            Outcome::Failed(stage) => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                metrics::TASKS_TOTAL.with_label_values(&["failed"]).inc();
                metrics::TASK_FAILURES.with_label_values(&[stage]).inc();
            }
            Outcome::Unreadable => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                metrics::TASKS_TOTAL.with_label_values(&["failed"]).inc();
                metrics::TASK_FAILURES.with_label_values(&["decode"]).inc();
            }
        }
    }

    /// Hand the message back to the consumer after the redelivery delay.
    ///
    /// Dropped on shutdown; the message is still uncommitted, so the next
    /// consumer session picks it up.
    fn schedule_release(&self, ack: AckHandle) {
        let consumer = Arc::clone(&self.consumer);
        let delay = self.config.redelivery_delay();
        let mut shutdown = self.shutdown.clone();
        let worker = self.id;

        tokio::spawn(async move {
            let stopped = tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => true,
                _ = tokio::time::sleep(delay) => false,
            };
            if stopped {
                return;
            }

            match consumer.release(&ack).await {
                Ok(()) => debug!(worker, offset = ack.offset, "Released message for redelivery"),
                Err(e) => warn!(worker, offset = ack.offset, error = %e, "Failed to release message"),
            }
        });
    }

    async fn handle(&self, delivery: Delivery) -> Outcome {
        let task_id = match delivery
            .key
            .clone()
            .or_else(|| Task::from_payload(&delivery.payload).ok().map(|t| t.id))
        {
            Some(id) => id,
            None => {
                error!(
                    worker = self.id,
                    offset = delivery.ack.offset,
                    "Message has no key and an unreadable payload"
                );
                return Outcome::Unreadable;
            }
        };

        if self.config.max_deliveries > 0 {
            match self.store.record_delivery(&task_id) {
                Ok(n) if n > self.config.max_deliveries => {
                    return self.dead_letter(&task_id, n, &delivery).await;
                }
                Ok(_) => {}
                Err(TaskError::NotFound(_)) => {
                    warn!(worker = self.id, task_id = %task_id, "Message for unknown task");
                    self.commit(&delivery, &task_id).await;
                    return Outcome::Skipped;
                }
                Err(e) => {
                    warn!(worker = self.id, task_id = %task_id, error = %e, "Failed to record delivery");
                    return Outcome::Failed("claim");
                }
            }
        }

        match self.claim(&task_id) {
            Ok(true) => {}
            Ok(false) => {
                self.commit(&delivery, &task_id).await;
                return Outcome::Skipped;
            }
            Err(stage) => return Outcome::Failed(stage),
        }

        let task = match Task::from_payload(&delivery.payload) {
            Ok(task) => task,
            Err(e) => {
                error!(worker = self.id, task_id = %task_id, error = %e, "Malformed task payload");
                return Outcome::Failed("decode");
            }
        };

        let source = match self.files.read_input(&task.storage_name).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(worker = self.id, task_id = %task_id, error = %e, "Failed to read input");
                return Outcome::Failed("read");
            }
        };

        let output = match self.run_transform(&task, source).await {
            Ok(output) => output,
            Err(stage) => return Outcome::Failed(stage),
        };

        if let Err(e) = self.files.write_output(&task.storage_name, &output.bytes).await {
            warn!(worker = self.id, task_id = %task_id, error = %e, "Failed to write output");
            return Outcome::Failed("write");
        }

        if let Err(e) = self.store.set_status(&task_id, TaskStatus::Processed) {
            warn!(worker = self.id, task_id = %task_id, error = %e, "Failed to mark task processed");
            return Outcome::Failed("status");
        }

        info!(
            worker = self.id,
            task_id = %task_id,
            width = output.width,
            height = output.height,
            "Task processed"
        );

        self.commit(&delivery, &task_id).await;
        Outcome::Processed
    }

    /// Moves the task to `processing` if it is new.
    ///
    /// Returns `Ok(false)` when the task should not be worked on at all.
    fn claim(&self, task_id: &str) -> Result<bool, &'static str> {
        let task = match self.store.get(task_id) {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!(worker = self.id, task_id, "Message for unknown task");
                return Ok(false);
            }
            Err(e) => {
                warn!(worker = self.id, task_id, error = %e, "Failed to load task");
                return Err("claim");
            }
        };

        match task.status {
            TaskStatus::Created => {
                if let Err(e) = self.store.set_status(task_id, TaskStatus::Processing) {
                    warn!(worker = self.id, task_id, error = %e, "Failed to mark task processing");
                    return Err("claim");
                }
                Ok(true)
            }
            TaskStatus::Processing | TaskStatus::Processed => {
                // Redelivery. The transform overwrites the same output.
                metrics::REDELIVERIES.inc();
                debug!(worker = self.id, task_id, status = %task.status, "Reprocessing redelivered task");
                Ok(true)
            }
            TaskStatus::Deleted | TaskStatus::Failed => {
                debug!(worker = self.id, task_id, status = %task.status, "Skipping task");
                Ok(false)
            }
        }
    }

    async fn run_transform(
        &self,
        task: &Task,
        source: Vec<u8>,
    ) -> Result<crate::transform::TransformOutput, &'static str> {
        let request = TransformRequest::from(task);
        let started = Instant::now();
        let work = transform_blocking(source, request);

        let result = match self.config.task_timeout() {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(worker = self.id, task_id = %task.id, ?limit, "Transform timed out");
                    return Err("timeout");
                }
            },
            None => work.await,
        };

        metrics::TRANSFORM_DURATION
            .with_label_values(&[task.format.as_str()])
            .observe(started.elapsed().as_secs_f64());

        result.map_err(|e: TransformError| {
            if e.is_fatal() {
                error!(worker = self.id, task_id = %task.id, error = %e, "Transform invariant violated");
            } else {
                warn!(worker = self.id, task_id = %task.id, error = %e, "Transform failed");
            }
            "transform"
        })
    }

    async fn dead_letter(&self, task_id: &str, deliveries: u32, delivery: &Delivery) -> Outcome {
        match self.store.set_status(task_id, TaskStatus::Failed) {
            Ok(_) => {
                error!(
                    worker = self.id,
                    task_id,
                    deliveries,
                    max = self.config.max_deliveries,
                    "Delivery limit exceeded, task marked failed"
                );
            }
            Err(e) => {
                // Already processed or deleted; nothing left to retry.
                debug!(worker = self.id, task_id, error = %e, "Not marking task failed");
            }
        }
        self.commit(delivery, task_id).await;
        Outcome::DeadLettered
    }

    /// Commit failures are logged only; status and file changes stand.
    async fn commit(&self, delivery: &Delivery, task_id: &str) {
        match self.consumer.commit(&delivery.ack).await {
            Ok(()) => {
                self.stats.committed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                metrics::TASK_FAILURES.with_label_values(&["commit"]).inc();
                warn!(
                    worker = self.id,
                    task_id,
                    offset = delivery.ack.offset,
                    error = %e,
                    "Failed to commit message"
                );
            }
        }
    }
}

/// A running pool: the poll loop plus `count` workers.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    poller: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    /// Spawn the poll loop and the workers.
    pub fn start(
        config: WorkerConfig,
        consumer: Arc<dyn TaskConsumer>,
        store: Arc<dyn TaskStore>,
        files: Arc<dyn FileArea>,
        policy: RetryPolicy,
    ) -> Self {
        let count = config.count.max(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let receiver = Arc::new(Mutex::new(rx));
        let stats = Arc::new(WorkerStats::default());

        info!(
            workers = count,
            task_timeout_secs = config.task_timeout_secs,
            max_deliveries = config.max_deliveries,
            redelivery_delay_ms = config.redelivery_delay_ms,
            "Starting worker pool"
        );

        let poller = spawn_poll_loop(Arc::clone(&consumer), tx, policy, shutdown_rx.clone());

        let workers = (0..count)
            .map(|id| {
                let worker = Worker {
                    id,
                    config: config.clone(),
                    consumer: Arc::clone(&consumer),
                    store: Arc::clone(&store),
                    files: Arc::clone(&files),
                    stats: Arc::clone(&stats),
                    shutdown: shutdown_rx.clone(),
                };
                tokio::spawn(worker.run(Arc::clone(&receiver)))
            })
            .collect();

        Self {
            shutdown_tx,
            poller,
            workers,
            stats,
        }
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Signal shutdown and wait for the poll loop and every worker.
    ///
    /// Tasks already in progress run to completion.
    pub async fn shutdown(self) {
        info!("Stopping worker pool");
        let _ = self.shutdown_tx.send(true);

        if let Err(e) = self.poller.await {
            error!(error = %e, "Poll loop panicked");
        }
        for handle in self.workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker panicked");
            }
        }
        info!("Worker pool stopped");
    }
}
