//! Image service: intake, lookup, delete, and backlog recovery.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::types::{ImageView, RecoverySummary, ServiceError};
use crate::broker::{RetryPolicy, TaskPublisher};
use crate::files::FileArea;
use crate::metrics;
use crate::task::{NewTask, Task, TaskStatus, TaskStore, DEFAULT_MAX_RESIZE_SIDE};

/// Extracts the lower-cased extension of an uploaded file name.
pub fn format_from_filename(filename: &str) -> Result<String, ServiceError> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_lowercase())
        .ok_or_else(|| ServiceError::Validation(format!("file name has no extension: {}", filename)))
}

fn check_id(id: &str) -> Result<(), ServiceError> {
    Uuid::parse_str(id)
        .map(|_| ())
        .map_err(|_| ServiceError::InvalidId(id.to_string()))
}

/// Front door of the pipeline.
pub struct ImageService {
    store: Arc<dyn TaskStore>,
    publisher: Arc<dyn TaskPublisher>,
    files: Arc<dyn FileArea>,
    formats: HashSet<String>,
    max_resize_side: u32,
    retry: RetryPolicy,
}

impl ImageService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        publisher: Arc<dyn TaskPublisher>,
        files: Arc<dyn FileArea>,
        formats: HashSet<String>,
        retry: RetryPolicy,
    ) -> Self {
        let formats = formats.into_iter().map(|f| f.to_lowercase()).collect();
        Self {
            store,
            publisher,
            files,
            formats,
            max_resize_side: DEFAULT_MAX_RESIZE_SIDE,
            retry,
        }
    }

    /// Bound each resize side at intake.
    pub fn with_max_resize_side(mut self, max: u32) -> Self {
        self.max_resize_side = max;
        self
    }

    pub fn formats(&self) -> &HashSet<String> {
        &self.formats
    }

    pub fn files(&self) -> &Arc<dyn FileArea> {
        &self.files
    }

    /// Validate, persist, store the original, and publish.
    ///
    /// The record is saved before the publish, so a failed publish leaves a
    /// `created` task for [`ImageService::recover_backlog`] to pick up.
    pub async fn intake(&self, request: NewTask, source: &[u8]) -> Result<Task, ServiceError> {
        let checked = Task::new(request, &self.formats)
            .and_then(|task| task.resize.check_max(self.max_resize_side).map(|_| task));
        let task = match checked {
            Ok(task) => task,
            Err(e) => {
                metrics::INTAKE_TOTAL.with_label_values(&["rejected"]).inc();
                debug!(error = %e, "Rejected upload");
                return Err(e.into());
            }
        };

        let result = self.persist_and_publish(&task, source).await;
        let label = if result.is_ok() { "accepted" } else { "error" };
        metrics::INTAKE_TOTAL.with_label_values(&[label]).inc();
        result?;

        info!(
            task_id = %task.id,
            format = %task.format,
            resize = %task.resize,
            mini = task.mini,
            "Accepted upload"
        );
        Ok(task)
    }

    async fn persist_and_publish(&self, task: &Task, source: &[u8]) -> Result<(), ServiceError> {
        self.retry
            .run(|| async { self.store.save(task) })
            .await
            .inspect_err(|e| error!(task_id = %task.id, error = %e, "Failed to save task"))?;

        self.files
            .write_input(&task.storage_name, source)
            .await
            .inspect_err(|e| error!(task_id = %task.id, error = %e, "Failed to store upload"))?;

        self.publish(task).await.inspect_err(|e| {
            metrics::PUBLISH_FAILURES.inc();
            error!(task_id = %task.id, error = %e, "Failed to publish task");
        })
    }

    async fn publish(&self, task: &Task) -> Result<(), ServiceError> {
        let payload = task.to_payload()?;
        self.retry
            .run(|| self.publisher.publish(&task.id, &payload))
            .await?;
        Ok(())
    }

    /// Look up a task. Deleted tasks are returned with status `deleted`.
    pub fn get(&self, id: &str) -> Result<Task, ServiceError> {
        check_id(id)?;
        self.store
            .get(id)?
            .ok_or_else(|| ServiceError::NotFound(id.to_string()))
    }

    /// Logically delete a task. Deleting twice is not an error.
    pub fn delete(&self, id: &str) -> Result<Task, ServiceError> {
        check_id(id)?;
        let task = self.store.delete(id)?;
        info!(task_id = %id, "Deleted task");
        Ok(task)
    }

    /// Resolve what a client should see for `id`.
    pub async fn fetch(&self, id: &str) -> Result<ImageView, ServiceError> {
        let task = self.get(id)?;

        match task.status {
            TaskStatus::Deleted => Ok(ImageView::Gone { task }),
            TaskStatus::Failed => Ok(ImageView::Failed { task }),
            TaskStatus::Processed => {
                if self.files.exists_output(&task.storage_name).await? {
                    let path = self.files.output_path(&task.storage_name)?;
                    Ok(ImageView::Ready { task, path })
                } else {
                    warn!(task_id = %task.id, "Task processed but output is missing");
                    Ok(ImageView::Pending { task })
                }
            }
            TaskStatus::Created | TaskStatus::Processing => Ok(ImageView::Pending { task }),
        }
    }

    /// Republish every task still in `created`.
    ///
    /// A failed publish is logged and counted; the sweep goes on with the
    /// remaining tasks.
    pub async fn recover_backlog(&self) -> Result<RecoverySummary, ServiceError> {
        let backlog = self
            .retry
            .run(|| async { self.store.list_by_status(TaskStatus::Created) })
            .await?;

        let mut summary = RecoverySummary {
            found: backlog.len(),
            ..Default::default()
        };

        for task in &backlog {
            match self.publish(task).await {
                Ok(()) => {
                    summary.republished += 1;
                    metrics::BACKLOG_REPUBLISHED.with_label_values(&["ok"]).inc();
                    debug!(task_id = %task.id, "Republished backlog task");
                }
                Err(e) => {
                    summary.failed += 1;
                    metrics::BACKLOG_REPUBLISHED.with_label_values(&["error"]).inc();
                    error!(task_id = %task.id, error = %e, "Failed to republish backlog task");
                }
            }
        }

        if summary.found > 0 {
            info!(
                found = summary.found,
                republished = summary.republished,
                failed = summary.failed,
                "Backlog recovery finished"
            );
        }

        Ok(summary)
    }
}
