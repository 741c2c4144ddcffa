//! Task storage trait and error type.

use thiserror::Error;

use super::types::{Task, TaskStatus};

/// Error type for task operations.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Intake parameters rejected.
    #[error("{0}")]
    Validation(String),

    /// Task not found.
    #[error("Task not found: {0}")]
    NotFound(String),

    /// Task with this id already exists.
    #[error("Task already exists: {0}")]
    AlreadyExists(String),

    /// Status change not allowed by the state machine.
    #[error("Cannot move task {task_id} from {from} to {to}")]
    InvalidTransition {
        task_id: String,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

/// Keyed record store for tasks.
///
/// Records are never physically removed; `delete` is a status change.
pub trait TaskStore: Send + Sync {
    /// Persist a new task.
    fn save(&self, task: &Task) -> Result<(), TaskError>;

    /// Get a task by id. Deleted tasks are returned with status `deleted`.
    fn get(&self, id: &str) -> Result<Option<Task>, TaskError>;

    /// Logically delete a task. Returns the updated record.
    fn delete(&self, id: &str) -> Result<Task, TaskError>;

    /// Move a task to a new status, enforcing the transition table.
    fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task, TaskError>;

    /// List tasks in the given status, oldest first.
    fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, TaskError>;

    /// Count tasks in the given status.
    fn count_by_status(&self, status: TaskStatus) -> Result<i64, TaskError>;

    /// Increment the delivery counter for a task and return the new value.
    fn record_delivery(&self, id: &str) -> Result<u32, TaskError>;
}
