//! Task records and the status state machine.

mod sqlite_store;
mod store;
mod types;

pub use sqlite_store::SqliteTaskStore;
pub use store::{TaskError, TaskStore};
pub use types::{
    NewTask, Resize, Task, TaskStatus, DEFAULT_MAX_RESIZE_SIDE, MAX_WATERMARK_CHARS,
};
