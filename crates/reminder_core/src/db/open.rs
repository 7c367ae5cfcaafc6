//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections.
//! - Verify the file is a readable database before handing it out.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have passed `PRAGMA quick_check`.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::recovery::move_aside;
use super::{DbError, DbResult};
use log::{error, info, warn};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection returned by [`open_db_with_recovery`].
#[derive(Debug)]
pub struct OpenedDb {
    pub conn: Connection,
    /// Where the unreadable original file was moved, when recovery ran.
    pub recovered_backup: Option<PathBuf>,
}

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Creates missing parent directories.
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| DbError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    open_with(|| Connection::open(path), "file")
}

/// Opens an in-memory SQLite database and applies all pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_with(Connection::open_in_memory, "memory")
}

/// Opens a database file, recovering from corrupt files.
///
/// When the first open attempt fails because the file is not a database,
/// is corrupt or carries a newer schema ([`DbError::is_corruption`]), the
/// file and its sidecars are renamed aside (see [`super::backup_path_for`])
/// and a fresh empty schema is created in its place. Any other error, such
/// as a lock held by another process, is returned without touching the file.
///
/// # Side effects
/// - May rename the database file and its sidecar files.
/// - Emits `db_recover` logging events.
pub fn open_db_with_recovery(path: impl AsRef<Path>) -> DbResult<OpenedDb> {
    let path = path.as_ref();
    let first_error = match open_db(path) {
        Ok(conn) => {
            return Ok(OpenedDb {
                conn,
                recovered_backup: None,
            })
        }
        Err(err) => err,
    };

    if !first_error.is_corruption() {
        // Busy, locked, unreachable or unreadable files are left untouched.
        warn!(
            "event=db_recover module=db status=skipped path={} error={}",
            path.display(),
            first_error
        );
        return Err(first_error);
    }

    warn!(
        "event=db_recover module=db status=start path={} error={}",
        path.display(),
        first_error
    );

    let backup = move_aside(path)?;
    match open_db(path) {
        Ok(conn) => {
            error!(
                "event=db_recover module=db status=recovered path={} backup={}",
                path.display(),
                backup
                    .as_deref()
                    .map_or_else(|| "none".to_string(), |p| p.display().to_string())
            );
            Ok(OpenedDb {
                conn,
                recovered_backup: backup,
            })
        }
        Err(err) => {
            error!(
                "event=db_recover module=db status=error path={} error_code=db_reinit_failed error={}",
                path.display(),
                err
            );
            Err(err)
        }
    }
}

fn open_with(
    open: impl FnOnce() -> rusqlite::Result<Connection>,
    mode: &'static str,
) -> DbResult<Connection> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start mode={mode}");

    let mut conn = match open() {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_open_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    match bootstrap_connection(&mut conn) {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={} duration_ms={}",
                mode,
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={} duration_ms={} error_code=db_bootstrap_failed error={}",
                mode,
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection) -> DbResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    check_integrity(conn)?;
    apply_migrations(conn)?;
    Ok(())
}

fn check_integrity(conn: &Connection) -> DbResult<()> {
    let verdict: String = conn.query_row("PRAGMA quick_check;", [], |row| row.get(0))?;
    if verdict != "ok" {
        return Err(DbError::IntegrityCheckFailed(verdict));
    }
    Ok(())
}
