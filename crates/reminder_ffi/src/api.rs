//! FFI use-case API for Flutter-facing calls.
//!
//! # Responsibility
//! - Expose stable, use-case-level reminder functions to Dart via FRB.
//! - Own the single process-wide reminder runtime (store + scheduler).
//! - Buffer fired reminders until the UI drains them.
//!
//! # Invariants
//! - Exported functions must not panic across FFI boundary.
//! - Timestamps cross the boundary as Unix epoch milliseconds.
//! - At most one runtime is open per process.

use chrono::{DateTime, Utc};
use log::{info, warn};
use once_cell::sync::Lazy;
use reminder_core::{
    core_version as core_version_inner, init_logging as init_logging_inner, ping as ping_inner,
    Dispatcher, NotificationEvent, ReminderConfig, ReminderService, Task, TaskStore, Timestamp,
};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const FIRED_BUFFER_CAPACITY: usize = 256;

static RUNTIME: Lazy<Mutex<Option<Runtime>>> = Lazy::new(|| Mutex::new(None));
static FIRED: Lazy<Mutex<VecDeque<NotificationEvent>>> =
    Lazy::new(|| Mutex::new(VecDeque::with_capacity(FIRED_BUFFER_CAPACITY)));

struct Runtime {
    data_dir: PathBuf,
    service: ReminderService<TaskStore>,
}

/// Minimal health-check API for FRB smoke integration.
///
/// # FFI contract
/// - Sync call, non-blocking.
/// - Never throws; always returns a UTF-8 string.
#[flutter_rust_bridge::frb(sync)]
pub fn ping() -> String {
    ping_inner().to_owned()
}

/// Expose core crate version through FFI.
#[flutter_rust_bridge::frb(sync)]
pub fn core_version() -> String {
    core_version_inner().to_owned()
}

/// Initializes Rust core logging once per process.
///
/// Input semantics:
/// - `level`: one of `trace|debug|info|warn|error` (case-insensitive).
/// - `log_dir`: absolute directory path where rolling logs are written.
///
/// # FFI contract
/// - Safe to call repeatedly with the same `level + log_dir` (idempotent).
/// - Never panics; returns empty string on success and error message on failure.
#[flutter_rust_bridge::frb(sync)]
pub fn init_logging(level: String, log_dir: String) -> String {
    match init_logging_inner(level.as_str(), log_dir.as_str()) {
        Ok(()) => String::new(),
        Err(err) => err,
    }
}

/// Stored task as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderItem {
    pub task_id: String,
    pub text: String,
    /// Reminder time, absent when the task has none.
    pub notify_at_epoch_ms: Option<i64>,
    pub created_at_epoch_ms: i64,
}

/// Armed reminder snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveReminderItem {
    pub task_id: String,
    pub text: String,
    pub fire_at_epoch_ms: i64,
    pub remaining_ms: u64,
}

/// Reminder that fired and has not been drained yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredReminderItem {
    pub task_id: String,
    pub text: String,
    pub fired_at_epoch_ms: i64,
}

/// Task list envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderListResponse {
    pub items: Vec<ReminderItem>,
    /// Human-readable response message for diagnostics.
    pub message: String,
}

/// Generic action response envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderActionResponse {
    /// Whether operation succeeded.
    pub ok: bool,
    /// Task affected by the action, when there is one.
    pub task_id: Option<String>,
    /// Human-readable response message for diagnostics/UI.
    pub message: String,
}

impl ReminderActionResponse {
    fn success(message: impl Into<String>, task_id: Option<String>) -> Self {
        Self {
            ok: true,
            task_id,
            message: message.into(),
        }
    }

    fn failure(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            task_id: None,
            message: message.into(),
        }
    }
}

/// Opens the reminder store under `data_dir` and starts the scheduler.
///
/// Future reminders are re-armed; missed ones are skipped.
///
/// # FFI contract
/// - Sync call; performs DB I/O and spawns the scheduler threads.
/// - Reopening with the same `data_dir` is a no-op success.
/// - A different `data_dir` while open is rejected.
/// - Never panics.
#[flutter_rust_bridge::frb(sync)]
pub fn reminders_open(data_dir: String) -> ReminderActionResponse {
    let trimmed = data_dir.trim();
    if trimmed.is_empty() {
        return ReminderActionResponse::failure("reminders_open failed: data_dir cannot be empty");
    }
    let config = ReminderConfig::with_data_dir(trimmed);
    open_runtime(&config, Dispatcher::for_current_platform())
}

/// Creates a task, arming a reminder when `notify_at_epoch_ms` is given.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_add(text: String, notify_at_epoch_ms: Option<i64>) -> ReminderActionResponse {
    let notify_at = match notify_at_epoch_ms.map(from_epoch_ms).transpose() {
        Ok(value) => value,
        Err(err) => return ReminderActionResponse::failure(format!("reminder_add failed: {err}")),
    };
    match with_service(|service| service.add_task(text, notify_at).map_err(|e| e.to_string())) {
        Ok(task) => ReminderActionResponse::success("Task created.", Some(task.id)),
        Err(err) => ReminderActionResponse::failure(format!("reminder_add failed: {err}")),
    }
}

/// Cancels the reminder of `task_id` and deletes the task.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_complete(task_id: String) -> ReminderActionResponse {
    match with_service(|service| service.complete_task(&task_id).map_err(|e| e.to_string())) {
        Ok(true) => ReminderActionResponse::success("Task completed.", Some(task_id)),
        Ok(false) => ReminderActionResponse::failure(format!("task not found: {task_id}")),
        Err(err) => ReminderActionResponse::failure(format!("reminder_complete failed: {err}")),
    }
}

/// Lists stored tasks ordered by creation time.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_list() -> ReminderListResponse {
    match with_service(|service| service.list_tasks().map_err(|e| e.to_string())) {
        Ok(tasks) => {
            let items = tasks.iter().map(to_reminder_item).collect::<Vec<_>>();
            let message = if items.is_empty() {
                "No tasks.".to_string()
            } else {
                format!("Found {} task(s).", items.len())
            };
            ReminderListResponse { items, message }
        }
        Err(err) => ReminderListResponse {
            items: Vec::new(),
            message: format!("reminder_list failed: {err}"),
        },
    }
}

/// Lists armed reminders ordered by fire time; empty when not open.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_active() -> Vec<ActiveReminderItem> {
    with_service(|service| {
        Ok(service
            .scheduler()
            .list_active()
            .into_iter()
            .map(|active| ActiveReminderItem {
                task_id: active.task_id,
                text: active.task_text,
                fire_at_epoch_ms: active.fire_time.timestamp_millis(),
                remaining_ms: u64::try_from(active.remaining.as_millis()).unwrap_or(u64::MAX),
            })
            .collect())
    })
    .unwrap_or_default()
}

/// Cancels every reminder and deletes every task.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_clear_all() -> ReminderActionResponse {
    match with_service(|service| service.clear_all().map_err(|e| e.to_string())) {
        Ok(removed) => ReminderActionResponse::success(format!("Removed {removed} task(s)."), None),
        Err(err) => ReminderActionResponse::failure(format!("reminder_clear_all failed: {err}")),
    }
}

/// Drains reminders fired since the previous call, oldest first.
///
/// # FFI contract
/// - Intended to be polled from the UI isolate.
/// - At most the newest 256 undrained reminders are kept.
#[flutter_rust_bridge::frb(sync)]
pub fn reminder_take_fired() -> Vec<FiredReminderItem> {
    lock_or_recover(&FIRED)
        .drain(..)
        .map(|event| FiredReminderItem {
            task_id: event.task_id,
            text: event.task_text,
            fired_at_epoch_ms: event.fired_at.timestamp_millis(),
        })
        .collect()
}

/// Stops the scheduler and closes the store. Closing twice is a no-op.
#[flutter_rust_bridge::frb(sync)]
pub fn reminders_close() -> ReminderActionResponse {
    let runtime = lock_or_recover(&RUNTIME).take();
    match runtime {
        Some(runtime) => {
            runtime.service.close();
            info!("event=ffi_close module=ffi status=ok");
            ReminderActionResponse::success("Reminders closed.", None)
        }
        None => ReminderActionResponse::success("Reminders already closed.", None),
    }
}

fn open_runtime(config: &ReminderConfig, dispatcher: Dispatcher) -> ReminderActionResponse {
    let mut slot = lock_or_recover(&RUNTIME);
    if let Some(runtime) = slot.as_ref() {
        if runtime.data_dir == config.data_dir {
            return ReminderActionResponse::success("Reminders already open.", None);
        }
        return ReminderActionResponse::failure(format!(
            "reminders_open failed: already open at `{}`; refusing to switch to `{}`",
            runtime.data_dir.display(),
            config.data_dir.display()
        ));
    }

    dispatcher.set_ui_callback(Arc::new(push_fired));
    match ReminderService::open(config, Arc::new(dispatcher)) {
        Ok((service, report)) => {
            info!(
                "event=ffi_open module=ffi status=ok armed={} missed={}",
                report.armed, report.missed
            );
            *slot = Some(Runtime {
                data_dir: config.data_dir.clone(),
                service,
            });
            ReminderActionResponse::success(
                format!("Reminders open; {} armed, {} missed.", report.armed, report.missed),
                None,
            )
        }
        Err(err) => {
            warn!("event=ffi_open module=ffi status=error error={err}");
            ReminderActionResponse::failure(format!("reminders_open failed: {err}"))
        }
    }
}

fn push_fired(event: &NotificationEvent) {
    let mut fired = lock_or_recover(&FIRED);
    if fired.len() >= FIRED_BUFFER_CAPACITY {
        fired.pop_front();
        warn!("event=ffi_fired_buffer module=ffi status=overflow capacity={FIRED_BUFFER_CAPACITY}");
    }
    fired.push_back(event.clone());
}

fn with_service<T>(
    f: impl FnOnce(&ReminderService<TaskStore>) -> Result<T, String>,
) -> Result<T, String> {
    let slot = lock_or_recover(&RUNTIME);
    match slot.as_ref() {
        Some(runtime) => f(&runtime.service),
        None => Err("reminders are not open; call reminders_open first".to_string()),
    }
}

fn to_reminder_item(task: &Task) -> ReminderItem {
    ReminderItem {
        task_id: task.id.clone(),
        text: task.text.clone(),
        notify_at_epoch_ms: task.notification_time.map(|at| at.timestamp_millis()),
        created_at_epoch_ms: task.created_at.timestamp_millis(),
    }
}

fn from_epoch_ms(value: i64) -> Result<Timestamp, String> {
    DateTime::<Utc>::from_timestamp_millis(value)
        .ok_or_else(|| format!("epoch millis out of range: {value}"))
}

fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::{
        core_version, from_epoch_ms, init_logging, open_runtime, ping, reminder_active,
        reminder_add, reminder_clear_all, reminder_complete, reminder_list, reminder_take_fired,
        reminders_close, reminders_open,
    };
    use chrono::Utc;
    use reminder_core::{Dispatcher, Notification, NotificationChannel, ReminderConfig};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    struct Quiet;

    impl NotificationChannel for Quiet {
        fn name(&self) -> &str {
            "quiet"
        }

        fn show(&self, _notification: &Notification) -> bool {
            true
        }
    }

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }

    #[test]
    fn init_logging_rejects_unsupported_level() {
        let error = init_logging("verbose".to_string(), "tmp/logs".to_string());
        assert!(!error.is_empty());
    }

    #[test]
    fn reminders_open_rejects_blank_dir() {
        let response = reminders_open("  ".to_string());
        assert!(!response.ok);
    }

    #[test]
    fn epoch_conversion_rejects_out_of_range_values() {
        assert!(from_epoch_ms(1_700_000_000_000).is_ok());
        assert!(from_epoch_ms(i64::MAX).is_err());
    }

    // Runtime is process-wide, so the whole lifecycle lives in one test.
    #[test]
    fn runtime_lifecycle_add_fire_complete_close() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let config = ReminderConfig::with_data_dir(dir.path());
        let quiet_dispatcher =
            || Dispatcher::new(Vec::new()).with_last_resort(Arc::new(Quiet));

        let closed_list = reminder_list();
        assert!(closed_list.message.contains("not open"));

        assert!(open_runtime(&config, quiet_dispatcher()).ok);
        assert!(open_runtime(&config, quiet_dispatcher()).ok);
        let conflict = open_runtime(&ReminderConfig::with_data_dir(other.path()), quiet_dispatcher());
        assert!(!conflict.ok);
        assert!(conflict.message.contains("refusing to switch"));

        let later = Utc::now().timestamp_millis() + 3_600_000;
        let kept = reminder_add("renew passport".to_string(), Some(later));
        assert!(kept.ok, "{}", kept.message);
        let soon = reminder_add(
            "buy milk".to_string(),
            Some(Utc::now().timestamp_millis() + 200),
        );
        assert!(soon.ok, "{}", soon.message);
        assert!(!reminder_add("   ".to_string(), None).ok);

        assert_eq!(reminder_list().items.len(), 2);

        let started = Instant::now();
        let mut fired = Vec::new();
        while fired.is_empty() && started.elapsed() < Duration::from_secs(3) {
            fired.extend(reminder_take_fired());
            thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].text, "buy milk");
        assert!(reminder_take_fired().is_empty());

        let active = reminder_active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].fire_at_epoch_ms, later);

        let kept_id = kept.task_id.unwrap();
        assert!(reminder_complete(kept_id.clone()).ok);
        assert!(!reminder_complete(kept_id).ok);
        assert!(reminder_active().is_empty());

        assert!(reminder_clear_all().ok);
        assert!(reminder_list().items.is_empty());

        assert!(reminders_close().ok);
        assert!(reminders_close().ok);
        assert!(reminder_active().is_empty());
    }
}
