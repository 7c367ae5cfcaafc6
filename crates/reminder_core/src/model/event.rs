//! Transient scheduler and dispatcher messages.

use crate::model::task::{TaskId, Timestamp};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A fired reminder waiting to be delivered.
///
/// `fired_at` is when the timer actually fired, which can be later than the
/// scheduled time for past-due reminders or a busy process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub task_id: TaskId,
    pub task_text: String,
    pub fired_at: Timestamp,
}

/// Inspection snapshot of one armed reminder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveReminder {
    pub task_id: TaskId,
    pub task_text: String,
    pub fire_time: Timestamp,
    /// Time left until firing, clamped to zero.
    pub remaining: Duration,
}
