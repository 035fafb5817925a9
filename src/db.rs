use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("coursework.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    init_schema(&conn)?;
    Ok(conn)
}

// Split out so tests can run against an in-memory connection.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL,
            is_approved INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            start_time TEXT,
            end_time TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_teacher ON assignments(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tasks(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            task_type TEXT NOT NULL,
            validation_type TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(assignment_id) REFERENCES assignments(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tasks_assignment ON tasks(assignment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tasks_assignment_sort ON tasks(assignment_id, sort_order)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_cases(
            id TEXT PRIMARY KEY,
            task_id TEXT NOT NULL,
            input_data TEXT NOT NULL DEFAULT '',
            expected_output TEXT NOT NULL,
            FOREIGN KEY(task_id) REFERENCES tasks(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_test_cases_task ON test_cases(task_id)",
        [],
    )?;

    Ok(())
}
