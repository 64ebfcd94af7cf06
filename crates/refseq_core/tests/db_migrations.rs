use refseq_core::db::migrations::latest_version;
use refseq_core::db::{open_db, open_db_in_memory, DbError};
use rusqlite::Connection;

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in [
        "sequences",
        "project_references",
        "projects",
        "userstories",
        "issues",
        "tasks",
    ] {
        assert_table_exists(&conn, table);
    }
}

#[test]
fn reopening_a_file_database_keeps_data_and_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("refseq.sqlite3");

    let conn = open_db(&path).unwrap();
    conn.execute("INSERT INTO sequences (name, value) VALUES ('s', 4);", [])
        .unwrap();
    drop(conn);

    let conn = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn), latest_version());
    let value: i64 = conn
        .query_row("SELECT value FROM sequences WHERE name = 's';", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(value, 4);

    let mode: String = conn
        .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(mode.to_ascii_lowercase(), "wal");
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.sqlite3");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    match open_db(&path).unwrap_err() {
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

#[test]
fn reference_numbers_are_unique_per_project_at_the_schema_level() {
    let conn = open_db_in_memory().unwrap();
    conn.execute(
        "INSERT INTO project_references (project_id, entity_type, entity_id, ref, created_at)
         VALUES (1, 'userstory', 1, 1, 0);",
        [],
    )
    .unwrap();

    let err = conn
        .execute(
            "INSERT INTO project_references (project_id, entity_type, entity_id, ref, created_at)
             VALUES (1, 'task', 9, 1, 0);",
            [],
        )
        .unwrap_err();
    assert!(refseq_core::db::is_unique_violation(&err));

    conn.execute(
        "INSERT INTO project_references (project_id, entity_type, entity_id, ref, created_at)
         VALUES (2, 'task', 9, 1, 0);",
        [],
    )
    .unwrap();
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
