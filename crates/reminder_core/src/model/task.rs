//! Task domain model.
//!
//! # Responsibility
//! - Define the canonical reminder record persisted by the task store.
//! - Provide constructors that stamp identity and creation time.
//!
//! # Invariants
//! - `id` is stable and never reused for another task.
//! - `text` is never empty for a persisted task.
//! - `created_at` is set once at construction and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Opaque task identifier.
///
/// Generated ids are UUID v4 strings, but callers importing existing data
/// may supply any non-empty value.
pub type TaskId = String;

/// Wall-clock point in time used across the engine.
pub type Timestamp = DateTime<Utc>;

/// Durable reminder record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Primary key shared by store and scheduler.
    pub id: TaskId,
    /// Display text shown in lists and notifications.
    pub text: String,
    /// When to notify; `None` means no reminder attached.
    #[serde(default)]
    pub notification_time: Option<Timestamp>,
    /// First-recorded time. Missing values in host payloads default to now.
    #[serde(default = "Utc::now")]
    pub created_at: Timestamp,
}

/// Validation failures for task records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValidationError {
    EmptyId,
    EmptyText,
}

impl Display for TaskValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyId => write!(f, "task id must not be empty"),
            Self::EmptyText => write!(f, "task text must not be empty"),
        }
    }
}

impl Error for TaskValidationError {}

impl Task {
    /// Creates a task with a generated UUID v4 id and no reminder.
    pub fn new(text: impl Into<String>) -> Self {
        Self::with_id(new_task_id(), text)
    }

    /// Creates a task with a caller-provided id.
    ///
    /// Used by import paths where identity already exists externally.
    /// This constructor does not validate; call [`Task::validate`] before
    /// persisting.
    pub fn with_id(id: impl Into<TaskId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            notification_time: None,
            created_at: Utc::now(),
        }
    }

    /// Attaches a reminder time.
    pub fn with_notification_time(mut self, at: Timestamp) -> Self {
        self.notification_time = Some(at);
        self
    }

    /// Checks record invariants required before persistence.
    pub fn validate(&self) -> Result<(), TaskValidationError> {
        if self.id.trim().is_empty() {
            return Err(TaskValidationError::EmptyId);
        }
        if self.text.trim().is_empty() {
            return Err(TaskValidationError::EmptyText);
        }
        Ok(())
    }

    pub fn has_reminder(&self) -> bool {
        self.notification_time.is_some()
    }

    /// Returns whether the reminder is strictly later than `now`.
    pub fn is_pending_at(&self, now: Timestamp) -> bool {
        self.notification_time.is_some_and(|at| at > now)
    }

    /// Returns whether a reminder exists and its time is not after `now`.
    pub fn is_overdue_at(&self, now: Timestamp) -> bool {
        self.notification_time.is_some_and(|at| at <= now)
    }
}

/// Generates a fresh random task id.
pub fn new_task_id() -> TaskId {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::{Task, TaskValidationError};
    use chrono::{Duration, Utc};

    #[test]
    fn new_task_gets_unique_uuid_ids() {
        let first = Task::new("water plants");
        let second = Task::new("water plants");
        assert_ne!(first.id, second.id);
        assert!(uuid::Uuid::parse_str(&first.id).is_ok());
        assert!(first.notification_time.is_none());
    }

    #[test]
    fn validate_rejects_blank_text_and_id() {
        assert_eq!(
            Task::new("   ").validate(),
            Err(TaskValidationError::EmptyText)
        );
        assert_eq!(
            Task::with_id("", "text").validate(),
            Err(TaskValidationError::EmptyId)
        );
        assert!(Task::with_id("a", "buy milk").validate().is_ok());
    }

    #[test]
    fn pending_and_overdue_are_exclusive() {
        let now = Utc::now();
        let future = Task::new("later").with_notification_time(now + Duration::minutes(5));
        let past = Task::new("earlier").with_notification_time(now - Duration::minutes(5));
        let plain = Task::new("no reminder");

        assert!(future.is_pending_at(now) && !future.is_overdue_at(now));
        assert!(past.is_overdue_at(now) && !past.is_pending_at(now));
        assert!(!plain.is_pending_at(now) && !plain.is_overdue_at(now));
    }

    #[test]
    fn deserialize_defaults_missing_created_at() {
        let before = Utc::now();
        let task: Task =
            serde_json::from_str(r#"{"id":"a","text":"buy milk"}"#).expect("valid task json");
        assert_eq!(task.id, "a");
        assert!(task.notification_time.is_none());
        assert!(task.created_at >= before);
    }
}
