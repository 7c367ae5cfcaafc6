use chrono::{Duration, TimeZone, Utc};
use reminder_core::{StoreError, Task, TaskRepository, TaskStore, TaskValidationError};
use rusqlite::Connection;
use std::sync::Arc;
use std::thread;

#[test]
fn save_and_load_all_round_trip_preserves_fields() {
    let store = TaskStore::open_in_memory().unwrap();
    let at = Utc.with_ymd_and_hms(2031, 7, 4, 18, 30, 15).unwrap() + Duration::microseconds(250);
    let task = Task::with_id("a", "buy milk").with_notification_time(at);

    store.save(&task).unwrap();

    let loaded = store.load_all().unwrap();
    assert_eq!(loaded, vec![task.clone()]);
    assert_eq!(store.get("a").unwrap(), Some(task));
    assert_eq!(store.get("missing").unwrap(), None);
}

#[test]
fn save_replaces_existing_task_with_same_id() {
    let store = TaskStore::open_in_memory().unwrap();
    let original = Task::with_id("a", "first draft");
    store.save(&original).unwrap();

    let mut edited = original.clone();
    edited.text = "final text".to_string();
    edited.notification_time = Some(Utc::now() + Duration::hours(1));
    store.save(&edited).unwrap();

    let loaded = store.load_all().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0], edited);
}

#[test]
fn load_all_orders_by_creation_time() {
    let store = TaskStore::open_in_memory().unwrap();
    let base = Utc.with_ymd_and_hms(2030, 1, 1, 8, 0, 0).unwrap();
    for (id, offset) in [("late", 20), ("early", 0), ("middle", 10)] {
        let mut task = Task::with_id(id, id);
        task.created_at = base + Duration::minutes(offset);
        store.save(&task).unwrap();
    }

    let ids = store
        .load_all()
        .unwrap()
        .into_iter()
        .map(|task| task.id)
        .collect::<Vec<_>>();
    assert_eq!(ids, vec!["early", "middle", "late"]);
}

#[test]
fn load_scheduled_returns_only_tasks_with_reminder() {
    let store = TaskStore::open_in_memory().unwrap();
    store.save(&Task::with_id("plain", "no reminder")).unwrap();
    store
        .save(&Task::with_id("timed", "with reminder").with_notification_time(Utc::now()))
        .unwrap();

    let scheduled = store.load_scheduled().unwrap();
    assert_eq!(scheduled.len(), 1);
    assert_eq!(scheduled[0].id, "timed");
}

#[test]
fn save_rejects_invalid_tasks() {
    let store = TaskStore::open_in_memory().unwrap();

    let err = store.save(&Task::with_id("", "text")).unwrap_err();
    assert!(matches!(err, StoreError::Validation(TaskValidationError::EmptyId)));

    let err = store.save(&Task::with_id("a", "   ")).unwrap_err();
    assert!(matches!(err, StoreError::Validation(TaskValidationError::EmptyText)));

    assert!(store.load_all().unwrap().is_empty());
}

#[test]
fn delete_and_delete_all_report_removed_rows() {
    let store = TaskStore::open_in_memory().unwrap();
    store.save(&Task::with_id("a", "one")).unwrap();
    store.save(&Task::with_id("b", "two")).unwrap();
    store.save(&Task::with_id("c", "three")).unwrap();

    assert!(store.delete("a").unwrap());
    assert!(!store.delete("a").unwrap());
    assert!(!store.delete("never-existed").unwrap());

    assert_eq!(store.delete_all().unwrap(), 2);
    assert!(store.load_all().unwrap().is_empty());
    assert_eq!(store.delete_all().unwrap(), 0);
}

#[test]
fn close_is_idempotent_and_rejects_later_operations() {
    let store = TaskStore::open_in_memory().unwrap();
    store.save(&Task::with_id("a", "one")).unwrap();

    store.close();
    store.close();

    assert!(store.is_closed());
    assert!(matches!(store.load_all(), Err(StoreError::Closed)));
    assert!(matches!(
        store.save(&Task::with_id("b", "two")),
        Err(StoreError::Closed)
    ));
}

#[test]
fn tasks_survive_reopening_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.db");
    let at = Utc::now() + Duration::days(2);

    {
        let store = TaskStore::open(&path).unwrap();
        store
            .save(&Task::with_id("a", "renew passport").with_notification_time(at))
            .unwrap();
    }

    let reopened = TaskStore::open(&path).unwrap();
    let task = reopened.get("a").unwrap().expect("task should persist");
    assert_eq!(task.text, "renew passport");
    assert_eq!(task.notification_time, Some(at));
    assert_eq!(reopened.path(), Some(path.as_path()));
}

#[test]
fn malformed_fields_degrade_instead_of_failing_the_load() {
    let store = TaskStore::from_connection(raw_connection_with_rows(&[
        ("bad-time", "stretch", Some("not a date"), "2030-01-01T00:00:00Z"),
        ("bad-created", "call mom", Some("2030-01-01T09:00:00Z"), "garbage"),
        ("empty-time", "water plants", Some(""), "2030-01-01T00:00:01Z"),
        ("ok", "read", None, "2030-01-01T00:00:02Z"),
    ]));

    let tasks = store.load_all().unwrap();
    assert_eq!(tasks.len(), 4);

    let by_id = |id: &str| tasks.iter().find(|task| task.id == id).unwrap().clone();
    assert_eq!(by_id("bad-time").notification_time, None);
    assert_eq!(by_id("empty-time").notification_time, None);
    assert_eq!(
        by_id("bad-created").notification_time,
        Some(Utc.with_ymd_and_hms(2030, 1, 1, 9, 0, 0).unwrap())
    );
    let fallback_age = Utc::now() - by_id("bad-created").created_at;
    assert!(fallback_age >= Duration::zero() && fallback_age < Duration::seconds(10));
    assert_eq!(by_id("ok").notification_time, None);
}

#[test]
fn corrupted_file_is_replaced_and_backed_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.db");
    let garbage = b"this is definitely not an sqlite database, just noise".repeat(64);
    std::fs::write(&path, &garbage).unwrap();

    let store = TaskStore::open(&path).unwrap();

    let backup = store
        .recovered_backup()
        .expect("backup should be reported")
        .to_path_buf();
    assert_eq!(backup, dir.path().join("tasks.db.backup"));
    assert_eq!(std::fs::read(&backup).unwrap(), garbage);

    assert!(store.load_all().unwrap().is_empty());
    store.save(&Task::with_id("a", "fresh start")).unwrap();
    assert_eq!(store.load_all().unwrap().len(), 1);
}

#[test]
fn locked_database_is_reported_and_left_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.db");
    {
        let store = TaskStore::open(&path).unwrap();
        store.save(&Task::with_id("keep", "keep me")).unwrap();
    }

    let holder = Connection::open(&path).unwrap();
    holder.execute_batch("BEGIN EXCLUSIVE;").unwrap();

    let err = match TaskStore::open(&path) {
        Err(StoreError::Db(err)) => err,
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("locked database must not open"),
    };
    assert!(!err.is_corruption());
    assert!(!dir.path().join("tasks.db.backup").exists());

    holder.execute_batch("COMMIT;").unwrap();
    drop(holder);

    let store = TaskStore::open(&path).unwrap();
    assert!(store.recovered_backup().is_none());
    assert_eq!(store.get("keep").unwrap().unwrap().text, "keep me");
}

#[test]
fn repeated_corruption_uses_numbered_backups() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tasks.db");

    for expected in ["tasks.db.backup", "tasks.db.backup.1"] {
        std::fs::write(&path, b"corrupt bytes that are long enough to not be empty").unwrap();
        let store = TaskStore::open(&path).unwrap();
        assert_eq!(store.recovered_backup(), Some(dir.path().join(expected).as_path()));
        store.close();
    }
}

#[test]
fn concurrent_saves_are_serialized() {
    let store = Arc::new(TaskStore::open_in_memory().unwrap());
    let workers = (0..8)
        .map(|worker| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                for n in 0..25 {
                    store
                        .save(&Task::with_id(format!("w{worker}-{n}"), "parallel"))
                        .unwrap();
                }
            })
        })
        .collect::<Vec<_>>();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(store.load_all().unwrap().len(), 200);
}

fn raw_connection_with_rows(rows: &[(&str, &str, Option<&str>, &str)]) -> Connection {
    let conn = reminder_core::db::open_db_in_memory().unwrap();
    for (id, text, notification_time, created_at) in rows {
        conn.execute(
            "INSERT INTO tasks (id, text, notification_time, created_at) VALUES (?1, ?2, ?3, ?4);",
            rusqlite::params![id, text, notification_time, created_at],
        )
        .unwrap();
    }
    conn
}
