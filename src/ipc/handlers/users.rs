use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str, user_json};
use crate::ipc::types::{AppState, Request};
use crate::users::{self, ROLE_STUDENT, ROLE_TEACHER};

fn handle_user_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let role = req
        .params
        .get("role")
        .and_then(|v| v.as_str())
        .unwrap_or(ROLE_STUDENT)
        .to_string();
    if role != ROLE_TEACHER && role != ROLE_STUDENT {
        return err(
            &req.id,
            "bad_params",
            format!("unknown role: {}", role),
            None,
        );
    }
    let approved = req
        .params
        .get("approved")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);

    match users::find_by_username(conn, &username) {
        Ok(Some(_)) => {
            return err(
                &req.id,
                "user_exists",
                format!("User '{}' already exists", username),
                None,
            )
        }
        Ok(None) => {}
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    }

    match users::create(conn, &username, &role, approved) {
        Ok(user) => ok(&req.id, user_json(&user)),
        Err(e) => err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(serde_json::json!({ "table": "users" })),
        ),
    }
}

fn handle_user_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let username = match required_str(req, "username") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    match users::find_by_username(conn, &username) {
        Ok(Some(user)) => ok(&req.id, user_json(&user)),
        Ok(None) => err(
            &req.id,
            "not_found",
            format!("User '{}' does not exist", username),
            None,
        ),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "user.create" => Some(handle_user_create(state, req)),
        "user.get" => Some(handle_user_get(state, req)),
        _ => None,
    }
}
