use crate::importer::{DEFAULT_TASK_TYPE, DEFAULT_VALIDATION_TYPE};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{acting_user, db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_task_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user = match acting_user(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Ownership scope: the assignment must belong to the acting teacher.
    let owned: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM assignments WHERE id = ? AND teacher_id = ?",
            (&assignment_id, &user.id),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if owned.is_none() {
        return err(&req.id, "not_found", "assignment not found", None);
    }

    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let description = match required_str(req, "description") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let task_type = optional_str(req, "taskType").unwrap_or_else(|| DEFAULT_TASK_TYPE.to_string());
    let validation_type =
        optional_str(req, "validationType").unwrap_or_else(|| DEFAULT_VALIDATION_TYPE.to_string());
    let order = req.params.get("order").and_then(|v| v.as_i64()).unwrap_or(0);

    let task_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO tasks(id, assignment_id, title, description, task_type, validation_type, sort_order)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &task_id,
            &assignment_id,
            &title,
            &description,
            &task_type,
            &validation_type,
            order,
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "tasks" })),
        );
    }

    ok(&req.id, json!({ "taskId": task_id, "title": title }))
}

fn handle_test_case_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user = match acting_user(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let task_id = match required_str(req, "taskId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    // Scope through the task's assignment.
    let owned: Option<i64> = match conn
        .query_row(
            "SELECT 1
             FROM tasks t
             JOIN assignments a ON a.id = t.assignment_id
             WHERE t.id = ? AND a.teacher_id = ?",
            (&task_id, &user.id),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if owned.is_none() {
        return err(&req.id, "not_found", "task not found", None);
    }

    // expectedOutput must be present; an empty string is a valid expectation.
    let expected_output = match req.params.get("expectedOutput").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => return err(&req.id, "bad_params", "missing expectedOutput", None),
    };
    let input_data = optional_str(req, "inputData").unwrap_or_default();

    let test_case_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO test_cases(id, task_id, input_data, expected_output)
         VALUES(?, ?, ?, ?)",
        (&test_case_id, &task_id, &input_data, &expected_output),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "test_cases" })),
        );
    }

    ok(&req.id, json!({ "testCaseId": test_case_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "task.create" => Some(handle_task_create(state, req)),
        "testCase.add" => Some(handle_test_case_add(state, req)),
        _ => None,
    }
}
