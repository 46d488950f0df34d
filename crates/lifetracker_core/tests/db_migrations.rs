use lifetracker_core::db::migrations::{latest_version, pending_migrations};
use lifetracker_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "workouts",
        "weigh_ins",
        "fasting_sessions",
        "nutrition_entries",
        "time_logs",
        "time_log_goals",
        "daily_agendas",
        "monthly_objectives",
        "habit_columns",
        "settings",
        "oauth_credentials",
        "api_credentials",
        "task_states",
        "tasks",
        "calendar_events",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn synced_tables_reject_duplicate_source_keys() {
    let conn = open_db_in_memory().unwrap();
    let insert = "INSERT INTO weigh_ins (source, source_id, measured_at, weight_lbs, created_at, updated_at)
                  VALUES ('Withings', '42', 0, 180.0, 0, 0);";
    conn.execute(insert, []).unwrap();
    assert!(conn.execute(insert, []).is_err());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifetracker.sqlite3");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "daily_agendas");
}

#[test]
fn open_db_creates_missing_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("nested").join("lifetracker.sqlite3");

    let conn = open_db(&path).unwrap();
    assert!(path.exists());
    assert!(pending_migrations(&conn).unwrap().is_empty());
    let mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_ascii_lowercase(), "wal");
}

#[test]
fn whoop_sport_names_are_seeded() {
    let conn = open_db_in_memory().unwrap();
    let name: String = conn
        .query_row(
            "SELECT sport_name FROM whoop_sports WHERE sport_id = 0;",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(name, "Running");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
