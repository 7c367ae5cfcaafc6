//! Task repository contract and SQLite-backed task store.
//!
//! # Responsibility
//! - Provide durable CRUD over the single `tasks` table.
//! - Serialize timestamps as RFC 3339 text and parse them back leniently.
//! - Serialize access to one shared connection across threads.
//!
//! # Invariants
//! - `save` uses insert-or-replace semantics keyed on `id`.
//! - A closed store rejects every operation with `StoreError::Closed`.
//! - Unparseable `notification_time` loads as `None`; unparseable
//!   `created_at` loads as the current time.

use crate::db::{open_db_in_memory, open_db_with_recovery, DbError};
use crate::model::task::{Task, TaskValidationError, Timestamp};
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use log::{debug, error, info, warn};
use rusqlite::{params, Connection, Row};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const TASK_SELECT_SQL: &str = "SELECT id, text, notification_time, created_at FROM tasks";

/// Naive layouts written by earlier versions of the app, read as local time.
const LEGACY_TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

pub type StoreResult<T> = Result<T, StoreError>;

/// Task persistence error.
#[derive(Debug)]
pub enum StoreError {
    Validation(TaskValidationError),
    Db(DbError),
    /// The store was closed with [`TaskStore::close`].
    Closed,
    /// A thread panicked while holding the connection.
    LockPoisoned,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Closed => write!(f, "task store is closed"),
            Self::LockPoisoned => write!(f, "task store connection lock is poisoned"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Closed | Self::LockPoisoned => None,
        }
    }
}

impl From<TaskValidationError> for StoreError {
    fn from(value: TaskValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Repository interface for task persistence.
pub trait TaskRepository: Send + Sync {
    /// Inserts or replaces one task by id.
    fn save(&self, task: &Task) -> StoreResult<()>;
    /// Loads every stored task ordered by `created_at`, then `id`.
    fn load_all(&self) -> StoreResult<Vec<Task>>;
    /// Loads tasks that carry a notification time.
    fn load_scheduled(&self) -> StoreResult<Vec<Task>>;
    fn get(&self, id: &str) -> StoreResult<Option<Task>>;
    /// Returns whether a row was removed.
    fn delete(&self, id: &str) -> StoreResult<bool>;
    /// Returns the number of rows removed.
    fn delete_all(&self) -> StoreResult<usize>;
}

/// SQLite-backed task store sharing one serialized connection.
pub struct TaskStore {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
    recovered_backup: Option<PathBuf>,
}

impl TaskStore {
    /// Opens (or creates) the store at `path`.
    ///
    /// An unreadable or corrupt file is moved aside and replaced by an empty
    /// schema; see [`TaskStore::recovered_backup`].
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let opened = open_db_with_recovery(path)?;
        info!(
            "event=store_open module=repo status=ok recovered={}",
            opened.recovered_backup.is_some()
        );
        Ok(Self {
            conn: Mutex::new(Some(opened.conn)),
            path: Some(path.to_path_buf()),
            recovered_backup: opened.recovered_backup,
        })
    }

    /// Opens a throwaway in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
            path: None,
            recovered_backup: None,
        }
    }

    /// Database file path, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Backup of the original file when opening had to recover.
    pub fn recovered_backup(&self) -> Option<&Path> {
        self.recovered_backup.as_deref()
    }

    /// Releases the underlying connection. Safe to call repeatedly.
    pub fn close(&self) {
        let Ok(mut guard) = self.conn.lock() else {
            warn!("event=store_close module=repo status=error error_code=lock_poisoned");
            return;
        };
        if let Some(conn) = guard.take() {
            if let Err((_, err)) = conn.close() {
                warn!("event=store_close module=repo status=error error={err}");
                return;
            }
            info!("event=store_close module=repo status=ok");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.conn.lock().map_or(true, |guard| guard.is_none())
    }

    fn with_conn<T>(
        &self,
        op: &'static str,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let result = self.lock().and_then(|guard| match guard.as_ref() {
            Some(conn) => f(conn),
            None => Err(StoreError::Closed),
        });
        if let Err(err) = &result {
            error!("event={op} module=repo status=error error={err}");
        }
        result
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Option<Connection>>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Drop for TaskStore {
    fn drop(&mut self) {
        self.close();
    }
}

impl TaskRepository for TaskStore {
    fn save(&self, task: &Task) -> StoreResult<()> {
        self.with_conn("task_save", |conn| {
            task.validate()?;
            conn.execute(
                "INSERT OR REPLACE INTO tasks (id, text, notification_time, created_at)
                 VALUES (?1, ?2, ?3, ?4);",
                params![
                    task.id.as_str(),
                    task.text.as_str(),
                    task.notification_time.as_ref().map(format_timestamp),
                    format_timestamp(&task.created_at),
                ],
            )?;
            debug!(
                "event=task_save module=repo status=ok task_id={} has_reminder={}",
                task.id,
                task.has_reminder()
            );
            Ok(())
        })
    }

    fn load_all(&self) -> StoreResult<Vec<Task>> {
        self.with_conn("task_load_all", |conn| {
            query_tasks(conn, &format!("{TASK_SELECT_SQL};"))
        })
    }

    fn load_scheduled(&self) -> StoreResult<Vec<Task>> {
        self.with_conn("task_load_scheduled", |conn| {
            query_tasks(
                conn,
                &format!("{TASK_SELECT_SQL} WHERE notification_time IS NOT NULL;"),
            )
        })
    }

    fn get(&self, id: &str) -> StoreResult<Option<Task>> {
        self.with_conn("task_get", |conn| {
            let mut stmt = conn.prepare(&format!("{TASK_SELECT_SQL} WHERE id = ?1;"))?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => Ok(parse_task_row(row)),
                None => Ok(None),
            }
        })
    }

    fn delete(&self, id: &str) -> StoreResult<bool> {
        self.with_conn("task_delete", |conn| {
            let removed = conn.execute("DELETE FROM tasks WHERE id = ?1;", [id])?;
            Ok(removed > 0)
        })
    }

    fn delete_all(&self) -> StoreResult<usize> {
        self.with_conn("task_delete_all", |conn| {
            let removed = conn.execute("DELETE FROM tasks;", [])?;
            info!("event=task_delete_all module=repo status=ok removed={removed}");
            Ok(removed)
        })
    }
}

fn query_tasks(conn: &Connection, sql: &str) -> StoreResult<Vec<Task>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;
    let mut tasks = Vec::new();
    while let Some(row) = rows.next()? {
        if let Some(task) = parse_task_row(row) {
            tasks.push(task);
        }
    }
    tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    Ok(tasks)
}

/// Parses one row, skipping it only when identity or text is unreadable.
fn parse_task_row(row: &Row<'_>) -> Option<Task> {
    let id = match row.get::<_, String>("id") {
        Ok(id) => id,
        Err(err) => {
            warn!("event=task_load module=repo status=skipped field=id error={err}");
            return None;
        }
    };
    let text = match row.get::<_, String>("text") {
        Ok(text) => text,
        Err(err) => {
            warn!("event=task_load module=repo status=skipped task_id={id} field=text error={err}");
            return None;
        }
    };

    let notification_time = match row.get::<_, Option<String>>("notification_time") {
        Ok(Some(raw)) => {
            let parsed = parse_timestamp(&raw);
            if parsed.is_none() && !raw.trim().is_empty() {
                warn!("event=task_load module=repo status=degraded task_id={id} field=notification_time");
            }
            parsed
        }
        Ok(None) => None,
        Err(err) => {
            warn!("event=task_load module=repo status=degraded task_id={id} field=notification_time error={err}");
            None
        }
    };

    let created_at = row
        .get::<_, Option<String>>("created_at")
        .ok()
        .flatten()
        .and_then(|raw| parse_timestamp(&raw))
        .unwrap_or_else(|| {
            warn!("event=task_load module=repo status=degraded task_id={id} field=created_at");
            Utc::now()
        });

    Some(Task {
        id,
        text,
        notification_time,
        created_at,
    })
}

/// Formats a timestamp as RFC 3339 with as many fraction digits as needed.
pub fn format_timestamp(value: &Timestamp) -> String {
    value.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Parses RFC 3339 text, falling back to naive local-time layouts.
pub fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    LEGACY_TIMESTAMP_FORMATS.iter().find_map(|format| {
        let naive = NaiveDateTime::parse_from_str(trimmed, format).ok()?;
        Local
            .from_local_datetime(&naive)
            .earliest()
            .map(|local| local.with_timezone(&Utc))
    })
}

#[cfg(test)]
mod tests {
    use super::{format_timestamp, parse_timestamp};
    use chrono::{Local, NaiveDate, TimeZone, Utc};

    #[test]
    fn format_then_parse_keeps_nanoseconds() {
        let value = Utc
            .with_ymd_and_hms(2026, 3, 14, 9, 26, 53)
            .unwrap()
            .checked_add_signed(chrono::Duration::nanoseconds(589_793_238))
            .unwrap();
        let text = format_timestamp(&value);
        assert_eq!(text, "2026-03-14T09:26:53.589793238+00:00");
        assert_eq!(parse_timestamp(&text), Some(value));
    }

    #[test]
    fn parse_accepts_offsets_and_legacy_naive_values() {
        let with_offset = parse_timestamp("2026-01-01T10:00:00+02:00").unwrap();
        assert_eq!(with_offset, Utc.with_ymd_and_hms(2026, 1, 1, 8, 0, 0).unwrap());

        let naive = NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_micro_opt(10, 0, 0, 250_000)
            .unwrap();
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_timestamp("2026-01-01T10:00:00.250000"), Some(expected));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("tomorrow-ish"), None);
    }
}
