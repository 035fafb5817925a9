use super::types::{AppState, Request};
use crate::ipc::error::err;
use crate::users::{self, User};
use rusqlite::Connection;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, serde_json::Value> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, serde_json::Value> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn optional_str(req: &Request, key: &str) -> Option<String> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.to_string())
}

/// Resolve the acting teacher named in params. The caller decides what the
/// user may do; this only looks the record up.
pub fn acting_user(
    conn: &Connection,
    req: &Request,
) -> Result<User, serde_json::Value> {
    let username = required_str(req, "teacher")?;
    match users::find_by_username(conn, &username) {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(err(
            &req.id,
            "not_found",
            format!("User '{}' does not exist", username),
            None,
        )),
        Err(e) => Err(err(&req.id, "db_query_failed", e.to_string(), None)),
    }
}

pub fn user_json(user: &User) -> serde_json::Value {
    serde_json::json!({
        "userId": user.id,
        "username": user.username,
        "role": user.role,
        "approved": user.is_approved
    })
}
