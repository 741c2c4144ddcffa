//! Mock task store for testing.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::task::{Task, TaskError, TaskStatus, TaskStore};

#[derive(Debug, Default)]
struct Failures {
    saves: u32,
    gets: u32,
    set_status: u32,
    lists: u32,
}

#[derive(Debug, Default)]
struct Inner {
    tasks: HashMap<String, Task>,
    deliveries: HashMap<String, u32>,
    status_writes: Vec<(String, TaskStatus)>,
    failures: Failures,
}

/// In-memory implementation of [`TaskStore`].
///
/// Provides controllable behavior for testing:
/// - Inject failures per operation
/// - Inspect every status write in order
///
/// Transitions follow the same table as the SQLite store.
#[derive(Debug, Default)]
pub struct MockTaskStore {
    inner: Mutex<Inner>,
}

fn injected(counter: &mut u32, op: &str) -> Result<(), TaskError> {
    if *counter > 0 {
        *counter -= 1;
        return Err(TaskError::Database(format!("injected {} failure", op)));
    }
    Ok(())
}

impl MockTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `n` saves fail.
    pub fn fail_next_saves(&self, n: u32) {
        self.lock().failures.saves = n;
    }

    /// Make the next `n` gets fail.
    pub fn fail_next_gets(&self, n: u32) {
        self.lock().failures.gets = n;
    }

    /// Make the next `n` status writes (including deletes) fail.
    pub fn fail_next_set_status(&self, n: u32) {
        self.lock().failures.set_status = n;
    }

    /// Make the next `n` list calls fail.
    pub fn fail_next_lists(&self, n: u32) {
        self.lock().failures.lists = n;
    }

    /// Every applied status write, oldest first.
    pub fn status_writes(&self) -> Vec<(String, TaskStatus)> {
        self.lock().status_writes.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Insert or replace a task without validation.
    pub fn insert(&self, task: Task) {
        self.lock().tasks.insert(task.id.clone(), task);
    }

    fn transition(inner: &mut Inner, id: &str, status: TaskStatus) -> Result<Task, TaskError> {
        injected(&mut inner.failures.set_status, "set_status")?;

        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;

        if !task.status.can_transition_to(status) {
            return Err(TaskError::InvalidTransition {
                task_id: id.to_string(),
                from: task.status,
                to: status,
            });
        }

        if task.status != status {
            task.status = status;
            let updated = task.clone();
            inner.status_writes.push((id.to_string(), status));
            return Ok(updated);
        }
        Ok(task.clone())
    }
}

impl TaskStore for MockTaskStore {
    fn save(&self, task: &Task) -> Result<(), TaskError> {
        let mut inner = self.lock();
        injected(&mut inner.failures.saves, "save")?;

        if inner.tasks.contains_key(&task.id) {
            return Err(TaskError::AlreadyExists(task.id.clone()));
        }
        inner.tasks.insert(task.id.clone(), task.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Task>, TaskError> {
        let mut inner = self.lock();
        injected(&mut inner.failures.gets, "get")?;
        Ok(inner.tasks.get(id).cloned())
    }

    fn delete(&self, id: &str) -> Result<Task, TaskError> {
        Self::transition(&mut self.lock(), id, TaskStatus::Deleted)
    }

    fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task, TaskError> {
        Self::transition(&mut self.lock(), id, status)
    }

    fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, TaskError> {
        let mut inner = self.lock();
        injected(&mut inner.failures.lists, "list")?;

        let mut tasks: Vec<Task> = inner
            .tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| t.created_at);
        Ok(tasks)
    }

    fn count_by_status(&self, status: TaskStatus) -> Result<i64, TaskError> {
        Ok(self
            .lock()
            .tasks
            .values()
            .filter(|t| t.status == status)
            .count() as i64)
    }

    fn record_delivery(&self, id: &str) -> Result<u32, TaskError> {
        let mut inner = self.lock();
        if !inner.tasks.contains_key(id) {
            return Err(TaskError::NotFound(id.to_string()));
        }
        let count = inner.deliveries.entry(id.to_string()).or_insert(0);
        *count += 1;
        Ok(*count)
    }
}
