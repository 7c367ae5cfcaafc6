//! Moves unreadable database files out of the way.

use super::{DbError, DbResult};
use chrono::Utc;
use log::warn;
use std::path::{Path, PathBuf};

const SIDECAR_SUFFIXES: &[&str] = &["-wal", "-shm", "-journal"];
const MAX_BACKUP_SLOTS: u32 = 100;

/// Returns the first free backup location for `path`.
///
/// `tasks.db` maps to `tasks.db.backup`, then `tasks.db.backup.1`, ... when
/// earlier backups already exist. Once every numbered slot is taken the
/// backup is named after the current time (`tasks.db.backup.<epoch ms>`),
/// so an existing backup is never overwritten.
pub fn backup_path_for(path: &Path) -> PathBuf {
    let base = with_suffix(path, ".backup");
    if !base.exists() {
        return base;
    }
    (1..MAX_BACKUP_SLOTS)
        .map(|slot| with_suffix(path, &format!(".backup.{slot}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| timestamped_backup(path))
}

fn timestamped_backup(path: &Path) -> PathBuf {
    let mut stamp = Utc::now().timestamp_millis();
    loop {
        let candidate = with_suffix(path, &format!(".backup.{stamp}"));
        if !candidate.exists() {
            return candidate;
        }
        stamp += 1;
    }
}

/// Renames `path` and its sidecars to the backup location.
///
/// `-wal`, `-shm` and `-journal` files follow the database so the backup
/// stays consistent (`tasks.db.backup-journal`, ...). When the database
/// cannot be renamed it is deleted together with its sidecars, since a
/// leftover journal would be replayed into the fresh schema.
///
/// Returns the backup path, or `None` when nothing was kept.
pub(super) fn move_aside(path: &Path) -> DbResult<Option<PathBuf>> {
    if !path.exists() {
        remove_sidecars(path);
        return Ok(None);
    }

    let backup = backup_path_for(path);
    match std::fs::rename(path, &backup) {
        Ok(()) => {
            move_sidecars(path, &backup);
            Ok(Some(backup))
        }
        Err(rename_err) => {
            warn!(
                "event=db_backup module=db status=error path={} error={}",
                path.display(),
                rename_err
            );
            let removed = if path.is_dir() {
                std::fs::remove_dir_all(path)
            } else {
                std::fs::remove_file(path)
            };
            removed.map_err(|source| DbError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            remove_sidecars(path);
            Ok(None)
        }
    }
}

fn move_sidecars(path: &Path, backup: &Path) {
    for suffix in SIDECAR_SUFFIXES {
        let sidecar = with_suffix(path, suffix);
        if !sidecar.is_file() {
            continue;
        }
        if let Err(err) = std::fs::rename(&sidecar, with_suffix(backup, suffix)) {
            warn!(
                "event=db_backup module=db status=error sidecar={} error={}",
                sidecar.display(),
                err
            );
            remove_sidecar(&sidecar);
        }
    }
}

fn remove_sidecars(path: &Path) {
    for suffix in SIDECAR_SUFFIXES {
        let sidecar = with_suffix(path, suffix);
        if sidecar.is_file() {
            remove_sidecar(&sidecar);
        }
    }
}

fn remove_sidecar(sidecar: &Path) {
    if let Err(err) = std::fs::remove_file(sidecar) {
        warn!(
            "event=db_backup module=db status=error sidecar={} error={}",
            sidecar.display(),
            err
        );
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(suffix);
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::{backup_path_for, move_aside};

    #[test]
    fn backup_path_appends_suffix_and_skips_taken_slots() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tasks.db");

        let first = backup_path_for(&db);
        assert_eq!(first, dir.path().join("tasks.db.backup"));

        std::fs::write(&first, b"old").unwrap();
        assert_eq!(backup_path_for(&db), dir.path().join("tasks.db.backup.1"));
    }

    #[test]
    fn exhausted_slots_never_reuse_an_existing_backup() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tasks.db");
        std::fs::write(dir.path().join("tasks.db.backup"), b"oldest").unwrap();
        for slot in 1..super::MAX_BACKUP_SLOTS {
            std::fs::write(dir.path().join(format!("tasks.db.backup.{slot}")), b"old").unwrap();
        }

        let next = backup_path_for(&db);

        assert!(!next.exists());
        let name = next.file_name().unwrap().to_str().unwrap().to_string();
        let stamp = name.strip_prefix("tasks.db.backup.").unwrap();
        assert!(stamp.parse::<i64>().unwrap() >= i64::from(super::MAX_BACKUP_SLOTS));
        assert_eq!(
            std::fs::read(dir.path().join("tasks.db.backup")).unwrap(),
            b"oldest"
        );
    }

    #[test]
    fn sidecars_move_next_to_the_backup() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("tasks.db");
        std::fs::write(&db, b"main bytes").unwrap();
        std::fs::write(dir.path().join("tasks.db-journal"), b"journal bytes").unwrap();
        std::fs::write(dir.path().join("tasks.db-wal"), b"wal bytes").unwrap();

        let backup = move_aside(&db).unwrap().expect("backup should be kept");

        assert_eq!(backup, dir.path().join("tasks.db.backup"));
        assert_eq!(std::fs::read(&backup).unwrap(), b"main bytes");
        assert_eq!(
            std::fs::read(dir.path().join("tasks.db.backup-journal")).unwrap(),
            b"journal bytes"
        );
        assert_eq!(
            std::fs::read(dir.path().join("tasks.db.backup-wal")).unwrap(),
            b"wal bytes"
        );
        assert!(!db.exists());
        assert!(!dir.path().join("tasks.db-journal").exists());
        assert!(!dir.path().join("tasks.db-wal").exists());
    }
}
