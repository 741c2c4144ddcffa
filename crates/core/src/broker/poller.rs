//! The single poller that feeds the worker channel.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::retry::RetryPolicy;
use super::traits::{Delivery, TaskConsumer};

/// Spawn a loop that polls `consumer` and forwards deliveries to `sender`.
///
/// Each poll runs under `policy`. When the policy gives up the error is
/// logged and polling resumes. The loop ends when `shutdown` flips to true
/// or every receiver is gone.
pub fn spawn_poll_loop(
    consumer: Arc<dyn TaskConsumer>,
    sender: mpsc::Sender<Delivery>,
    policy: RetryPolicy,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Poll loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            let delivery = tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                result = policy.run(|| consumer.poll()) => result,
            };

            match delivery {
                Ok(delivery) => {
                    // Also wait on shutdown so a full channel cannot wedge the loop.
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            continue;
                        }
                        sent = sender.send(delivery) => {
                            if sent.is_err() {
                                info!("Worker channel closed");
                                break;
                            }
                        }
                    }
                }
                Err(e) => {
                    error!(error = %e, "Polling failed after retries");
                    // Back off before the next round of retries.
                    tokio::select! {
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                            continue;
                        }
                        _ = tokio::time::sleep(policy.initial_delay()) => {}
                    }
                }
            }
        }
        info!("Poll loop stopped");
    })
}
