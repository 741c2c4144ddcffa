//! Periodic backlog sweep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::service::ImageService;

/// Run [`ImageService::recover_backlog`] once now, then every `interval`.
///
/// With no interval the task ends after the startup sweep.
pub fn spawn_recovery_loop(
    service: Arc<ImageService>,
    interval: Option<Duration>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(?interval, "Recovery loop started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            if let Err(e) = service.recover_backlog().await {
                warn!(error = %e, "Backlog recovery failed");
            }

            let Some(interval) = interval else {
                break;
            };

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Recovery loop stopped");
    })
}
