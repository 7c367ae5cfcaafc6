//! Notification channel contract.

use crate::model::event::NotificationEvent;

pub const REMINDER_TITLE: &str = "Reminder";
pub const REMINDER_SUBTITLE: &str = "Scheduled Reminder";

/// Content handed to a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub message: String,
    pub subtitle: Option<String>,
    /// Platform sound name; channels pick their own default when `None`.
    pub sound: Option<String>,
}

impl Notification {
    /// Builds the standard reminder notification for a fired event.
    pub fn for_event(event: &NotificationEvent) -> Self {
        Self {
            title: REMINDER_TITLE.to_string(),
            message: format!("Reminder: {}", event.task_text),
            subtitle: Some(REMINDER_SUBTITLE.to_string()),
            sound: None,
        }
    }

    /// Message with the subtitle folded in, for channels without a subtitle slot.
    pub fn body_with_subtitle(&self) -> String {
        match &self.subtitle {
            Some(subtitle) => format!("{subtitle}\n\n{}", self.message),
            None => self.message.clone(),
        }
    }
}

/// Delivery strategy for one host notification mechanism.
///
/// Implementations must return within a short bounded time and report
/// failure through the return value instead of panicking.
pub trait NotificationChannel: Send + Sync {
    /// Stable name used in logs and delivery reports.
    fn name(&self) -> &str;

    /// Shows `notification`; returns whether it was displayed.
    fn show(&self, notification: &Notification) -> bool;
}
