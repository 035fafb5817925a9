use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

pub const ROLE_TEACHER: &str = "TEACHER";
pub const ROLE_STUDENT: &str = "STUDENT";

#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub role: String,
    pub is_approved: bool,
}

impl User {
    pub fn is_teacher(&self) -> bool {
        self.role == ROLE_TEACHER && self.is_approved
    }
}

pub fn find_by_username(conn: &Connection, username: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        "SELECT id, username, role, is_approved FROM users WHERE username = ?",
        [username],
        |row| {
            Ok(User {
                id: row.get(0)?,
                username: row.get(1)?,
                role: row.get(2)?,
                is_approved: row.get::<_, i64>(3)? != 0,
            })
        },
    )
    .optional()
}

pub fn create(
    conn: &Connection,
    username: &str,
    role: &str,
    approved: bool,
) -> rusqlite::Result<User> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO users(id, username, role, is_approved) VALUES(?, ?, ?, ?)",
        (&id, username, role, if approved { 1 } else { 0 }),
    )?;
    Ok(User {
        id,
        username: username.to_string(),
        role: role.to_string(),
        is_approved: approved,
    })
}
