//! Core task data types and the status state machine.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::store::TaskError;

/// Maximum watermark length, in characters.
pub const MAX_WATERMARK_CHARS: usize = 20;

/// Default bound on each resize side, in pixels.
pub const DEFAULT_MAX_RESIZE_SIDE: u32 = 8192;

// ============================================================================
// Status
// ============================================================================

/// Processing status of a task.
///
/// Status only moves forward along `created -> processing -> processed`.
/// `deleted` is reachable from any non-deleted state and is terminal.
/// `failed` is the dead-letter status used when a delivery cap is configured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Persisted at intake, not yet claimed by a worker.
    Created,
    /// Claimed by a worker; transform in progress or awaiting redelivery.
    Processing,
    /// Transform finished and the output file is written.
    Processed,
    /// Logically deleted. The record stays in the store.
    Deleted,
    /// Redelivered past the configured cap and dead-lettered.
    Failed,
}

impl TaskStatus {
    /// Returns the status as stored and serialised.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::Processing => "processing",
            TaskStatus::Processed => "processed",
            TaskStatus::Deleted => "deleted",
            TaskStatus::Failed => "failed",
        }
    }

    /// Returns true if no further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Deleted | TaskStatus::Failed)
    }

    /// Returns true if a worker should skip (and acknowledge) a delivery
    /// for a task in this status.
    pub fn is_dead(&self) -> bool {
        self.is_terminal()
    }

    /// Returns true if moving from `self` to `next` is allowed.
    ///
    /// Writing the current status again is accepted so that redelivered
    /// messages can repeat their status writes without failing.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;

        if *self == next {
            return true;
        }

        match (self, next) {
            (Deleted, _) => false,
            (_, Deleted) => true,
            (Created, Processing) => true,
            (Processing, Processed) => true,
            (Created, Failed) | (Processing, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(TaskStatus::Created),
            "processing" => Ok(TaskStatus::Processing),
            "processed" => Ok(TaskStatus::Processed),
            "deleted" => Ok(TaskStatus::Deleted),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(TaskError::Database(format!("unknown status: {}", other))),
        }
    }
}

// ============================================================================
// Resize
// ============================================================================

/// Target dimensions for a resize. `{0, 0}` means no resize was requested.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Resize {
    pub width: u32,
    pub height: u32,
}

impl Resize {
    /// The "no resize" sentinel.
    pub const NONE: Resize = Resize {
        width: 0,
        height: 0,
    };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Parses the `WIDTHxHEIGHT` intake form.
    ///
    /// An empty string yields [`Resize::NONE`]. Both sides must be positive.
    pub fn parse(s: &str) -> Result<Self, TaskError> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Resize::NONE);
        }

        let parts: Vec<&str> = s.split('x').collect();
        if parts.len() != 2 {
            return Err(TaskError::Validation(format!(
                "resize must be in format WIDTHxHEIGHT, e.g. 1024x768, got: {}",
                s
            )));
        }

        let width = parse_side(parts[0]).ok_or_else(|| {
            TaskError::Validation("resize width must be a positive integer".to_string())
        })?;
        let height = parse_side(parts[1]).ok_or_else(|| {
            TaskError::Validation("resize height must be a positive integer".to_string())
        })?;

        Ok(Resize { width, height })
    }

    /// Returns true if at least one dimension is set.
    pub fn is_requested(&self) -> bool {
        self.width > 0 || self.height > 0
    }

    /// Rejects a resize with either side above `max`.
    pub fn check_max(&self, max: u32) -> Result<(), TaskError> {
        if self.width > max || self.height > max {
            return Err(TaskError::Validation(format!(
                "resize {} exceeds the maximum side of {} pixels",
                self, max
            )));
        }
        Ok(())
    }

    /// Returns true for the sentinel or for both-positive dimensions.
    pub fn is_valid(&self) -> bool {
        *self == Resize::NONE || (self.width > 0 && self.height > 0)
    }
}

fn parse_side(s: &str) -> Option<u32> {
    s.trim().parse::<u32>().ok().filter(|v| *v > 0)
}

impl fmt::Display for Resize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// ============================================================================
// Task
// ============================================================================

/// Intake parameters for a new task, before validation.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    /// Target encoding, e.g. `png`. Case-insensitive.
    pub format: String,
    /// Optional watermark text (empty = none).
    pub watermark: String,
    /// Resize in `WIDTHxHEIGHT` form (empty = none).
    pub resize: String,
    /// Produce a thumbnail after the resize step.
    pub mini: bool,
}

/// A single upload's requested transform and its lifecycle status.
///
/// The same shape is stored in the task store and sent as the queue payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier (UUID v4). Store key and queue routing key.
    pub id: String,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// Current status.
    pub status: TaskStatus,
    /// Lower-cased encoding, member of the configured whitelist.
    pub format: String,
    /// File name (`<id>.<format>`) used in both the input and output areas.
    pub storage_name: String,
    /// Watermark text, empty when none.
    #[serde(default)]
    pub watermark: String,
    /// Resize target, [`Resize::NONE`] when none.
    #[serde(default)]
    pub resize: Resize,
    /// Thumbnail requested.
    #[serde(default)]
    pub mini: bool,
}

impl Task {
    /// Validates intake parameters and builds a task in `created` status.
    pub fn new(request: NewTask, supported_formats: &HashSet<String>) -> Result<Self, TaskError> {
        let format = request.format.trim().to_lowercase();
        if !supported_formats.contains(&format) {
            return Err(TaskError::Validation(format!("unsupported format: {}", format)));
        }

        if request.watermark.chars().count() > MAX_WATERMARK_CHARS {
            return Err(TaskError::Validation(format!(
                "watermark must be less than or equal to {} characters",
                MAX_WATERMARK_CHARS
            )));
        }

        let resize = Resize::parse(&request.resize)?;

        let id = uuid::Uuid::new_v4().to_string();
        let storage_name = format!("{}.{}", id, format);

        Ok(Self {
            id,
            created_at: Utc::now(),
            status: TaskStatus::Created,
            format,
            storage_name,
            watermark: request.watermark,
            resize,
            mini: request.mini,
        })
    }

    /// Encodes the task as a queue payload.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Decodes a queue payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formats() -> HashSet<String> {
        ["png", "jpg", "jpeg", "gif"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn request(format: &str, watermark: &str, resize: &str, mini: bool) -> NewTask {
        NewTask {
            format: format.to_string(),
            watermark: watermark.to_string(),
            resize: resize.to_string(),
            mini,
        }
    }

    #[test]
    fn test_parse_resize_valid() {
        let resize = Resize::parse("500x400").unwrap();
        assert_eq!(resize, Resize::new(500, 400));
    }

    #[test]
    fn test_parse_resize_empty_is_none() {
        assert_eq!(Resize::parse("").unwrap(), Resize::NONE);
        assert!(!Resize::NONE.is_requested());
    }

    #[test]
    fn test_parse_resize_invalid_format() {
        let err = Resize::parse("500-400").unwrap_err();
        assert!(err.to_string().contains("resize must be in format"));
    }

    #[test]
    fn test_parse_resize_non_integer() {
        let err = Resize::parse("abcx400").unwrap_err();
        assert!(err.to_string().contains("resize width must be a positive integer"));
    }

    #[test]
    fn test_parse_resize_zero_or_negative() {
        let err = Resize::parse("0x100").unwrap_err();
        assert!(err.to_string().contains("resize width must be a positive integer"));

        let err = Resize::parse("100x-1").unwrap_err();
        assert!(err.to_string().contains("resize height must be a positive integer"));
    }

    #[test]
    fn test_resize_check_max() {
        assert!(Resize::NONE.check_max(100).is_ok());
        assert!(Resize::new(100, 100).check_max(100).is_ok());

        let err = Resize::new(101, 10).check_max(100).unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
        assert!(Resize::parse("100000x100000")
            .unwrap()
            .check_max(DEFAULT_MAX_RESIZE_SIDE)
            .is_err());
    }

    #[test]
    fn test_resize_validity() {
        assert!(Resize::NONE.is_valid());
        assert!(Resize::new(10, 20).is_valid());
        assert!(!Resize::new(0, 20).is_valid());
        assert!(!Resize::new(10, 0).is_valid());
    }

    #[test]
    fn test_new_task_valid() {
        let task = Task::new(request("PNG", "WM", "500x500", true), &formats()).unwrap();

        assert_eq!(task.status, TaskStatus::Created);
        assert_eq!(task.format, "png");
        assert_eq!(task.watermark, "WM");
        assert_eq!(task.resize, Resize::new(500, 500));
        assert!(task.mini);
        assert_eq!(task.storage_name, format!("{}.png", task.id));
        assert!(uuid::Uuid::parse_str(&task.id).is_ok());
    }

    #[test]
    fn test_new_task_unsupported_format() {
        let err = Task::new(request("bmp", "", "", false), &formats()).unwrap_err();
        assert!(matches!(err, TaskError::Validation(_)));
        assert!(err.to_string().contains("unsupported format"));
    }

    #[test]
    fn test_new_task_watermark_too_long() {
        let err = Task::new(
            request("png", "thisisaverylongwatermarktext", "500x500", false),
            &formats(),
        )
        .unwrap_err();
        assert!(err
            .to_string()
            .contains("watermark must be less than or equal to 20 characters"));
    }

    #[test]
    fn test_new_task_watermark_counts_characters() {
        // 20 Cyrillic characters are 40 bytes but still within the limit.
        let watermark = "водяной знак водяной";
        assert_eq!(watermark.chars().count(), 20);
        assert!(Task::new(request("png", watermark, "", false), &formats()).is_ok());
    }

    #[test]
    fn test_new_task_ids_are_unique() {
        let a = Task::new(request("png", "", "", false), &formats()).unwrap();
        let b = Task::new(request("png", "", "", false), &formats()).unwrap();
        assert_ne!(a.id, b.id);
        assert_ne!(a.storage_name, b.storage_name);
    }

    #[test]
    fn test_payload_roundtrip_preserves_fields() {
        let task = Task::new(request("gif", "hi", "64x32", true), &formats()).unwrap();
        let decoded = Task::from_payload(&task.to_payload().unwrap()).unwrap();
        assert_eq!(decoded, task);
    }

    #[test]
    fn test_malformed_payload_rejected() {
        assert!(Task::from_payload(b"{not json").is_err());
    }

    #[test]
    fn test_forward_transitions() {
        assert!(TaskStatus::Created.can_transition_to(TaskStatus::Processing));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Processed));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Failed));
    }

    #[test]
    fn test_no_regression() {
        assert!(!TaskStatus::Processed.can_transition_to(TaskStatus::Processing));
        assert!(!TaskStatus::Processed.can_transition_to(TaskStatus::Created));
        assert!(!TaskStatus::Processing.can_transition_to(TaskStatus::Created));
        assert!(!TaskStatus::Created.can_transition_to(TaskStatus::Processed));
    }

    #[test]
    fn test_delete_from_any_live_state() {
        for status in [
            TaskStatus::Created,
            TaskStatus::Processing,
            TaskStatus::Processed,
            TaskStatus::Failed,
        ] {
            assert!(status.can_transition_to(TaskStatus::Deleted), "{}", status);
        }
        assert!(!TaskStatus::Deleted.can_transition_to(TaskStatus::Processing));
        assert!(!TaskStatus::Deleted.can_transition_to(TaskStatus::Processed));
    }

    #[test]
    fn test_same_state_write_is_allowed() {
        assert!(TaskStatus::Processed.can_transition_to(TaskStatus::Processed));
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Processing));
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!("deleted".parse::<TaskStatus>().unwrap(), TaskStatus::Deleted);
        assert!("bogus".parse::<TaskStatus>().is_err());
    }
}
