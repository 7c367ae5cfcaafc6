//! Engine configuration and data directory resolution.
//!
//! # Responsibility
//! - Hold tunables for the scheduler, store location and logging.
//! - Resolve the per-platform application data directory.
//!
//! # Invariants
//! - `Default` values match the desktop app's behavior.
//! - Config structs are plain data; nothing here performs I/O except
//!   `default_data_dir`, which only looks up directories.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const APP_DIR_NAME: &str = "Reminders";
const DEFAULT_DB_FILE_NAME: &str = "tasks.db";
const DATA_DIR_ENV: &str = "REMINDERS_DATA_DIR";

/// What startup reconciliation does with reminders whose time passed while
/// the process was not running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedReminderPolicy {
    /// Treat them as missed; they stay in the store but never fire.
    #[default]
    Skip,
    /// Fire them once, immediately, during reconciliation.
    FireImmediately,
}

/// Scheduler thread tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Bounded wait of the delivery consumer between shutdown-flag checks.
    #[serde(with = "millis")]
    pub poll_interval: Duration,
    /// Upper bound on how long `shutdown` waits for the consumer.
    #[serde(with = "millis")]
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(2),
        }
    }
}

/// Top-level configuration for hosts embedding the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub data_dir: PathBuf,
    pub db_file_name: String,
    pub log_level: String,
    pub scheduler: SchedulerConfig,
    pub missed_policy: MissedReminderPolicy,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_file_name: DEFAULT_DB_FILE_NAME.to_string(),
            log_level: crate::logging::default_log_level().to_string(),
            scheduler: SchedulerConfig::default(),
            missed_policy: MissedReminderPolicy::default(),
        }
    }
}

impl ReminderConfig {
    /// Default config rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file_name)
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

/// Resolves the application data directory.
///
/// - `REMINDERS_DATA_DIR` when set and non-empty
/// - otherwise the platform data dir (`dirs::data_dir`) joined with
///   `Reminders`: `~/Library/Application Support` on macOS, `%APPDATA%` on
///   Windows, `$XDG_DATA_HOME` or `~/.local/share` elsewhere
pub fn default_data_dir() -> PathBuf {
    resolve_data_dir(std::env::var(DATA_DIR_ENV).ok())
}

fn resolve_data_dir(override_dir: Option<String>) -> PathBuf {
    if let Some(dir) = override_dir
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
    {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(value.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
