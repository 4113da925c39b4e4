use rusqlite::Connection;
use talenttrack_core::db::migrations::latest_version;
use talenttrack_core::db::{open_db, open_db_in_memory, DbError};

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    assert_table_exists(&conn, "users");
    assert_table_exists(&conn, "sessions");
    assert_table_exists(&conn, "teams");
    assert_table_exists(&conn, "team_members");
    assert_table_exists(&conn, "topics");
    assert_table_exists(&conn, "subtopics");
    assert_table_exists(&conn, "candidates");
    assert_table_exists(&conn, "candidate_skills");
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("talenttrack.db");

    let conn_first = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_first), latest_version());
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    assert_table_exists(&conn_second, "topics");
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

#[test]
fn deleting_a_topic_cascades_to_subtopics() {
    let conn = open_db_in_memory().unwrap();

    conn.execute_batch(
        "INSERT INTO topics (uuid, name) VALUES ('t-1', 'Algorithms');
         INSERT INTO subtopics (uuid, topic_uuid, name) VALUES ('s-1', 't-1', 'Arrays');
         INSERT INTO subtopics (uuid, topic_uuid, name) VALUES ('s-2', 't-1', 'Graphs');",
    )
    .unwrap();

    conn.execute("DELETE FROM topics WHERE uuid = 't-1';", [])
        .unwrap();

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM subtopics;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn deleting_a_candidate_cascades_to_skills() {
    let conn = open_db_in_memory().unwrap();

    conn.execute_batch(
        "INSERT INTO users (uuid, display_name) VALUES ('u-1', 'Owner');
         INSERT INTO teams (uuid, name, owner_user_uuid) VALUES ('team-1', 'Core', 'u-1');
         INSERT INTO candidates (uuid, team_uuid, full_name) VALUES ('c-1', 'team-1', 'Ada');
         INSERT INTO candidate_skills (uuid, candidate_uuid, name) VALUES ('k-1', 'c-1', 'Rust');
         INSERT INTO candidate_skills (uuid, candidate_uuid, name) VALUES ('k-2', 'c-1', 'SQL');",
    )
    .unwrap();

    conn.execute("DELETE FROM candidates WHERE uuid = 'c-1';", [])
        .unwrap();

    let remaining: i64 = conn
        .query_row("SELECT COUNT(*) FROM candidate_skills;", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(remaining, 0);
}

#[test]
fn skill_names_are_unique_per_candidate_only() {
    let conn = open_db_in_memory().unwrap();

    conn.execute_batch(
        "INSERT INTO users (uuid, display_name) VALUES ('u-1', 'Owner');
         INSERT INTO teams (uuid, name, owner_user_uuid) VALUES ('team-1', 'Core', 'u-1');
         INSERT INTO candidates (uuid, team_uuid, full_name) VALUES ('c-1', 'team-1', 'Ada');
         INSERT INTO candidates (uuid, team_uuid, full_name) VALUES ('c-2', 'team-1', 'Grace');
         INSERT INTO candidate_skills (uuid, candidate_uuid, name) VALUES ('k-1', 'c-1', 'Rust');
         INSERT INTO candidate_skills (uuid, candidate_uuid, name) VALUES ('k-2', 'c-2', 'Rust');",
    )
    .unwrap();

    let err = conn
        .execute(
            "INSERT INTO candidate_skills (uuid, candidate_uuid, name)
             VALUES ('k-3', 'c-1', 'Rust');",
            [],
        )
        .unwrap_err();
    assert!(err.to_string().contains("UNIQUE constraint failed"));
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
