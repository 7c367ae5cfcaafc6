//! Core reminder engine: task persistence, reminder scheduling and
//! notification delivery.
//! This crate is the single source of truth for reminder invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod notify;
pub mod repo;
pub mod scheduler;
pub mod service;

pub use config::{default_data_dir, MissedReminderPolicy, ReminderConfig, SchedulerConfig};
pub use logging::{default_log_level, init_logging, init_logging_for, logging_status};
pub use model::event::{ActiveReminder, NotificationEvent};
pub use model::task::{new_task_id, Task, TaskId, TaskValidationError, Timestamp};
pub use notify::{DeliveryReport, Dispatcher, Notification, NotificationChannel, UiCallback};
pub use repo::task_repo::{StoreError, StoreResult, TaskRepository, TaskStore};
pub use scheduler::Scheduler;
pub use service::reminder_service::{
    ReconcileReport, ReminderService, ServiceError, ServiceResult,
};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
