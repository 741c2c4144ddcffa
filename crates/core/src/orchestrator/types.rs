//! Types for the image service.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::broker::BrokerError;
use crate::files::FileError;
use crate::task::{Task, TaskError};

/// Errors surfaced to intake and lookup callers.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Intake parameters rejected.
    #[error("{0}")]
    Validation(String),

    /// Id is not a UUID.
    #[error("invalid task id: {0}")]
    InvalidId(String),

    /// No task with this id.
    #[error("task not found: {0}")]
    NotFound(String),

    /// Task store error.
    #[error("task store error: {0}")]
    Store(TaskError),

    /// File area error.
    #[error("file error: {0}")]
    Files(#[from] FileError),

    /// Publishing the task failed after retries.
    #[error("publish failed: {0}")]
    Publish(#[from] BrokerError),

    /// Task could not be serialized.
    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<TaskError> for ServiceError {
    fn from(err: TaskError) -> Self {
        match err {
            TaskError::Validation(msg) => ServiceError::Validation(msg),
            TaskError::NotFound(id) => ServiceError::NotFound(id),
            other => ServiceError::Store(other),
        }
    }
}

impl ServiceError {
    /// True when the caller sent something wrong.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::Validation(_) | ServiceError::InvalidId(_) | ServiceError::NotFound(_)
        )
    }
}

/// What a fetch found.
#[derive(Debug, Clone)]
pub enum ImageView {
    /// Processed and the output file is on disk.
    Ready { task: Task, path: PathBuf },
    /// Not processed yet.
    Pending { task: Task },
    /// Dead-lettered after too many deliveries.
    Failed { task: Task },
    /// Logically deleted.
    Gone { task: Task },
}

impl ImageView {
    pub fn task(&self) -> &Task {
        match self {
            ImageView::Ready { task, .. }
            | ImageView::Pending { task }
            | ImageView::Failed { task }
            | ImageView::Gone { task } => task,
        }
    }
}

/// Result of one backlog sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySummary {
    /// Tasks found in `created`.
    pub found: usize,
    /// Tasks published again.
    pub republished: usize,
    /// Tasks whose publish failed after retries.
    pub failed: usize,
}
