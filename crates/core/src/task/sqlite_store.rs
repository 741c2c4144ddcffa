//! SQLite-backed task store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{Resize, Task, TaskError, TaskStatus, TaskStore};

const TASK_COLUMNS: &str =
    "id, created_at, status, format, storage_name, watermark, resize_width, resize_height, mini";

/// SQLite-backed task store.
pub struct SqliteTaskStore {
    conn: Mutex<Connection>,
}

impl SqliteTaskStore {
    /// Create a new SQLite task store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, TaskError> {
        let conn = Connection::open(path).map_err(|e| TaskError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite task store (useful for testing).
    pub fn in_memory() -> Result<Self, TaskError> {
        let conn = Connection::open_in_memory().map_err(|e| TaskError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), TaskError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL,
                format TEXT NOT NULL,
                storage_name TEXT NOT NULL,
                watermark TEXT NOT NULL DEFAULT '',
                resize_width INTEGER NOT NULL DEFAULT 0,
                resize_height INTEGER NOT NULL DEFAULT 0,
                mini INTEGER NOT NULL DEFAULT 0,
                deliveries INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_created_at ON tasks(created_at);
            "#,
        )
        .map_err(|e| TaskError::Database(e.to_string()))?;

        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, TaskError> {
        self.conn
            .lock()
            .map_err(|_| TaskError::Database("connection lock poisoned".to_string()))
    }

    fn row_to_task(row: &rusqlite::Row) -> rusqlite::Result<Task> {
        let id: String = row.get(0)?;
        let created_at_str: String = row.get(1)?;
        let status_str: String = row.get(2)?;
        let format: String = row.get(3)?;
        let storage_name: String = row.get(4)?;
        let watermark: String = row.get(5)?;
        let resize_width: u32 = row.get(6)?;
        let resize_height: u32 = row.get(7)?;
        let mini: bool = row.get(8)?;

        let created_at = DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        let status: TaskStatus = status_str.parse().map_err(|e: TaskError| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

        Ok(Task {
            id,
            created_at,
            status,
            format,
            storage_name,
            watermark,
            resize: Resize::new(resize_width, resize_height),
            mini,
        })
    }

    fn fetch(conn: &Connection, id: &str) -> Result<Option<Task>, TaskError> {
        conn.query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?", TASK_COLUMNS),
            params![id],
            Self::row_to_task,
        )
        .optional()
        .map_err(|e| TaskError::Database(e.to_string()))
    }

    fn transition(conn: &Connection, id: &str, status: TaskStatus) -> Result<Task, TaskError> {
        let current = Self::fetch(conn, id)?.ok_or_else(|| TaskError::NotFound(id.to_string()))?;

        if !current.status.can_transition_to(status) {
            return Err(TaskError::InvalidTransition {
                task_id: id.to_string(),
                from: current.status,
                to: status,
            });
        }

        if current.status == status {
            return Ok(current);
        }

        conn.execute(
            "UPDATE tasks SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), Utc::now().to_rfc3339(), id],
        )
        .map_err(|e| TaskError::Database(e.to_string()))?;

        Ok(Task { status, ..current })
    }
}

impl TaskStore for SqliteTaskStore {
    fn save(&self, task: &Task) -> Result<(), TaskError> {
        let conn = self.conn()?;

        let result = conn.execute(
            "INSERT INTO tasks (id, created_at, status, format, storage_name, watermark, resize_width, resize_height, mini, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                task.id,
                task.created_at.to_rfc3339(),
                task.status.as_str(),
                task.format,
                task.storage_name,
                task.watermark,
                task.resize.width,
                task.resize.height,
                task.mini,
                Utc::now().to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(TaskError::AlreadyExists(task.id.clone()))
            }
            Err(e) => Err(TaskError::Database(e.to_string())),
        }
    }

    fn get(&self, id: &str) -> Result<Option<Task>, TaskError> {
        let conn = self.conn()?;
        Self::fetch(&conn, id)
    }

    fn delete(&self, id: &str) -> Result<Task, TaskError> {
        let conn = self.conn()?;
        Self::transition(&conn, id, TaskStatus::Deleted)
    }

    fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task, TaskError> {
        let conn = self.conn()?;
        Self::transition(&conn, id, status)
    }

    fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>, TaskError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM tasks WHERE status = ? ORDER BY created_at ASC",
                TASK_COLUMNS
            ))
            .map_err(|e| TaskError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params![status.as_str()], Self::row_to_task)
            .map_err(|e| TaskError::Database(e.to_string()))?;

        let mut tasks = Vec::new();
        for row_result in rows {
            tasks.push(row_result.map_err(|e| TaskError::Database(e.to_string()))?);
        }

        Ok(tasks)
    }

    fn count_by_status(&self, status: TaskStatus) -> Result<i64, TaskError> {
        let conn = self.conn()?;

        conn.query_row(
            "SELECT COUNT(*) FROM tasks WHERE status = ?",
            params![status.as_str()],
            |row| row.get(0),
        )
        .map_err(|e| TaskError::Database(e.to_string()))
    }

    fn record_delivery(&self, id: &str) -> Result<u32, TaskError> {
        let conn = self.conn()?;

        let updated = conn
            .execute(
                "UPDATE tasks SET deliveries = deliveries + 1, updated_at = ? WHERE id = ?",
                params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| TaskError::Database(e.to_string()))?;

        if updated == 0 {
            return Err(TaskError::NotFound(id.to_string()));
        }

        conn.query_row(
            "SELECT deliveries FROM tasks WHERE id = ?",
            params![id],
            |row| row.get(0),
        )
        .map_err(|e| TaskError::Database(e.to_string()))
    }
}
