//! Reminder use-case service.
//!
//! # Responsibility
//! - Keep store and scheduler consistent for add/complete/reschedule/clear.
//! - Re-arm reminders from persisted tasks at startup (reconciliation).
//!
//! # Invariants
//! - A task is persisted before its reminder is armed.
//! - A reminder is cancelled before its task is deleted.
//! - Missed reminders follow an explicit `MissedReminderPolicy`.

use crate::config::{MissedReminderPolicy, ReminderConfig};
use crate::model::task::{Task, TaskId, TaskValidationError, Timestamp};
use crate::notify::Dispatcher;
use crate::repo::task_repo::{StoreError, TaskRepository, TaskStore};
use crate::scheduler::Scheduler;
use chrono::Utc;
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Service error for reminder use-cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Input failed task validation.
    Validation(TaskValidationError),
    /// Target task does not exist.
    TaskNotFound(TaskId),
    /// Persistence-layer failure.
    Store(StoreError),
    /// Scheduler threads could not be started.
    Spawn(std::io::Error),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::TaskNotFound(id) => write!(f, "task not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Spawn(err) => write!(f, "failed to start scheduler: {err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Spawn(err) => Some(err),
            Self::TaskNotFound(_) => None,
        }
    }
}

impl From<TaskValidationError> for ServiceError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for ServiceError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Validation(err) => Self::Validation(err),
            other => Self::Store(other),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Outcome of startup reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileReport {
    /// Tasks read from the store.
    pub loaded: usize,
    /// Future reminders re-armed.
    pub armed: usize,
    /// Reminders whose time passed while the process was not running.
    pub missed: usize,
    /// Missed reminders fired under `MissedReminderPolicy::FireImmediately`.
    pub fired_missed: usize,
}

/// Use-case facade over a task repository and a shared scheduler.
pub struct ReminderService<R: TaskRepository> {
    repo: R,
    scheduler: Arc<Scheduler>,
}

impl<R: TaskRepository> ReminderService<R> {
    pub fn new(repo: R, scheduler: Arc<Scheduler>) -> Self {
        Self { repo, scheduler }
    }

    pub fn repo(&self) -> &R {
        &self.repo
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    /// Creates and persists a task, arming its reminder when a time is given.
    ///
    /// # Contract
    /// - Text is trimmed; blank text is rejected.
    /// - A reminder time in the past fires immediately.
    pub fn add_task(
        &self,
        text: impl Into<String>,
        notification_time: Option<Timestamp>,
    ) -> ServiceResult<Task> {
        let text = text.into();
        let mut task = Task::new(text.trim());
        task.notification_time = notification_time;
        task.validate()?;

        self.repo.save(&task)?;
        self.arm(&task);
        Ok(task)
    }

    /// Cancels the reminder and deletes the task.
    ///
    /// Returns whether a stored task was removed.
    pub fn complete_task(&self, id: &str) -> ServiceResult<bool> {
        let cancelled = self.scheduler.cancel(id);
        let removed = self.repo.delete(id)?;
        info!(
            "event=task_complete module=service status=ok task_id={id} cancelled={cancelled} removed={removed}"
        );
        Ok(removed)
    }

    /// Replaces the reminder time of a stored task.
    ///
    /// `None` removes the reminder and cancels any armed entry.
    pub fn reschedule(
        &self,
        id: &str,
        notification_time: Option<Timestamp>,
    ) -> ServiceResult<Task> {
        let mut task = self
            .repo
            .get(id)?
            .ok_or_else(|| ServiceError::TaskNotFound(id.to_string()))?;
        task.notification_time = notification_time;
        self.repo.save(&task)?;

        if task.has_reminder() {
            self.arm(&task);
        } else {
            self.scheduler.cancel(&task.id);
        }
        Ok(task)
    }

    /// Cancels every reminder of stored tasks, then empties the store.
    ///
    /// Returns the number of tasks removed.
    pub fn clear_all(&self) -> ServiceResult<usize> {
        for task in self.repo.load_all()? {
            self.scheduler.cancel(&task.id);
        }
        Ok(self.repo.delete_all()?)
    }

    pub fn get_task(&self, id: &str) -> ServiceResult<Option<Task>> {
        Ok(self.repo.get(id)?)
    }

    /// All stored tasks ordered by creation time.
    pub fn list_tasks(&self) -> ServiceResult<Vec<Task>> {
        Ok(self.repo.load_all()?)
    }

    /// Stored tasks that carry a reminder time.
    pub fn scheduled_tasks(&self) -> ServiceResult<Vec<Task>> {
        Ok(self.repo.load_scheduled()?)
    }

    /// Re-arms the scheduler from persisted tasks.
    ///
    /// Future reminders are armed. Reminders already due are counted as
    /// missed; under `FireImmediately` they fire once and their stored time
    /// is cleared so the next startup does not fire them again.
    pub fn reconcile(&self, policy: MissedReminderPolicy) -> ServiceResult<ReconcileReport> {
        let tasks = self.repo.load_all()?;
        let now = Utc::now();
        let mut report = ReconcileReport {
            loaded: tasks.len(),
            ..ReconcileReport::default()
        };

        for task in tasks {
            if task.is_pending_at(now) {
                if self.arm(&task) {
                    report.armed += 1;
                }
                continue;
            }
            if !task.is_overdue_at(now) {
                continue;
            }

            report.missed += 1;
            match policy {
                MissedReminderPolicy::Skip => {
                    debug!("event=reconcile module=service status=missed task_id={}", task.id);
                }
                MissedReminderPolicy::FireImmediately => {
                    if self.scheduler.schedule(&task.id, now, &task.text) {
                        report.fired_missed += 1;
                    }
                    let mut fired = task;
                    fired.notification_time = None;
                    if let Err(err) = self.repo.save(&fired) {
                        warn!(
                            "event=reconcile module=service status=error task_id={} error={}",
                            fired.id, err
                        );
                    }
                }
            }
        }

        info!(
            "event=reconcile module=service status=ok policy={:?} loaded={} armed={} missed={} fired_missed={}",
            policy, report.loaded, report.armed, report.missed, report.fired_missed
        );
        Ok(report)
    }

    /// Arms the task's reminder; returns whether the scheduler accepted it.
    fn arm(&self, task: &Task) -> bool {
        let Some(at) = task.notification_time else {
            return false;
        };
        let armed = self.scheduler.schedule(&task.id, at, &task.text);
        if !armed {
            warn!(
                "event=task_schedule module=service status=error task_id={} reason=scheduler_stopped",
                task.id
            );
        }
        armed
    }
}

impl ReminderService<TaskStore> {
    /// Opens the store from `config`, starts a scheduler around
    /// `dispatcher` and reconciles with `config.missed_policy`.
    pub fn open(
        config: &ReminderConfig,
        dispatcher: Arc<Dispatcher>,
    ) -> ServiceResult<(Self, ReconcileReport)> {
        let store = TaskStore::open(config.db_path())?;
        if let Some(backup) = store.recovered_backup() {
            warn!(
                "event=service_open module=service status=recovered backup={}",
                backup.display()
            );
        }
        let scheduler =
            Scheduler::new(dispatcher, config.scheduler).map_err(ServiceError::Spawn)?;
        let service = Self::new(store, Arc::new(scheduler));
        let report = service.reconcile(config.missed_policy)?;
        Ok((service, report))
    }

    /// Stops the scheduler and releases the store connection.
    pub fn close(&self) {
        self.scheduler.shutdown();
        self.repo.close();
    }
}
