use crate::importer::Timestamp;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{acting_user, db_conn, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use serde_json::json;
use uuid::Uuid;

fn handle_assignment_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user = match acting_user(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    if !user.is_teacher() {
        return err(
            &req.id,
            "not_a_teacher",
            format!("User {} is not a teacher", user.username),
            None,
        );
    }

    let title = match required_str(req, "title") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    // Form-field style: everything beyond the title is stored as given.
    let description = optional_str(req, "description").unwrap_or_default();
    let start_time = optional_str(req, "startTime");
    let end_time = optional_str(req, "endTime");

    let assignment_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO assignments(id, teacher_id, title, description, start_time, end_time, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &assignment_id,
            &user.id,
            &title,
            &description,
            start_time.as_deref(),
            end_time.as_deref(),
            Utc::now().to_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "assignments" })),
        );
    }

    ok(&req.id, json!({ "assignmentId": assignment_id, "title": title }))
}

fn handle_assignments_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user = match acting_user(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    // Include task counts so the dashboard has something to show.
    let mut stmt = match conn.prepare(
        "SELECT
           a.id,
           a.title,
           a.description,
           a.start_time,
           a.end_time,
           a.created_at,
           (SELECT COUNT(*) FROM tasks t WHERE t.assignment_id = a.id) AS task_count
         FROM assignments a
         WHERE a.teacher_id = ?
         ORDER BY a.created_at DESC, a.rowid DESC",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([&user.id], |row| {
            let id: String = row.get(0)?;
            let title: String = row.get(1)?;
            let description: String = row.get(2)?;
            let start_time: Option<String> = row.get(3)?;
            let end_time: Option<String> = row.get(4)?;
            let created_at: String = row.get(5)?;
            let task_count: i64 = row.get(6)?;
            Ok(json!({
                "assignmentId": id,
                "title": title,
                "description": description,
                "startTime": start_time,
                "endTime": end_time,
                "createdAt": created_at,
                "taskCount": task_count
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(assignments) => ok(&req.id, json!({ "assignments": assignments })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

// Availability window check: out of window means not live; an unset or
// unparseable bound does not constrain.
fn is_live(start_time: Option<&str>, end_time: Option<&str>) -> bool {
    let now = Utc::now().naive_utc();
    if let Some(start) = start_time.filter(|s| !s.is_empty()) {
        if let Ok(t) = Timestamp::parse("start_time", start) {
            if now < t.as_naive_utc() {
                return false;
            }
        }
    }
    if let Some(end) = end_time.filter(|s| !s.is_empty()) {
        if let Ok(t) = Timestamp::parse("end_time", end) {
            if now > t.as_naive_utc() {
                return false;
            }
        }
    }
    true
}

fn handle_assignment_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let assignment_id = match required_str(req, "assignmentId") {
        Ok(v) => v,
        Err(resp) => return resp,
    };

    let row: Option<(String, String, String, Option<String>, Option<String>, String)> = match conn
        .query_row(
            "SELECT a.title, a.description, u.username, a.start_time, a.end_time, a.created_at
             FROM assignments a
             JOIN users u ON u.id = a.teacher_id
             WHERE a.id = ?",
            [&assignment_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                ))
            },
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let Some((title, description, teacher, start_time, end_time, created_at)) = row else {
        return err(&req.id, "not_found", "assignment not found", None);
    };

    let tasks = match load_tasks(conn, &assignment_id) {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    ok(
        &req.id,
        json!({
            "assignmentId": assignment_id,
            "title": title,
            "description": description,
            "teacher": teacher,
            "startTime": start_time,
            "endTime": end_time,
            "createdAt": created_at,
            "live": is_live(start_time.as_deref(), end_time.as_deref()),
            "tasks": tasks
        }),
    )
}

fn load_tasks(conn: &Connection, assignment_id: &str) -> rusqlite::Result<Vec<serde_json::Value>> {
    let mut task_stmt = conn.prepare(
        "SELECT id, title, description, task_type, validation_type, sort_order
         FROM tasks
         WHERE assignment_id = ?
         ORDER BY sort_order, rowid",
    )?;
    let tasks: Vec<(String, String, String, String, String, i64)> = task_stmt
        .query_map([assignment_id], |r| {
            Ok((
                r.get(0)?,
                r.get(1)?,
                r.get(2)?,
                r.get(3)?,
                r.get(4)?,
                r.get(5)?,
            ))
        })?
        .collect::<Result<_, _>>()?;

    let mut tc_stmt = conn.prepare(
        "SELECT id, input_data, expected_output
         FROM test_cases
         WHERE task_id = ?
         ORDER BY rowid",
    )?;

    let mut out = Vec::new();
    for (id, title, description, task_type, validation_type, sort_order) in tasks {
        let test_cases: Vec<serde_json::Value> = tc_stmt
            .query_map([&id], |r| {
                let tc_id: String = r.get(0)?;
                let input_data: String = r.get(1)?;
                let expected_output: String = r.get(2)?;
                Ok(json!({
                    "testCaseId": tc_id,
                    "inputData": input_data,
                    "expectedOutput": expected_output
                }))
            })?
            .collect::<Result<_, _>>()?;

        out.push(json!({
            "taskId": id,
            "title": title,
            "description": description,
            "taskType": task_type,
            "validationType": validation_type,
            "order": sort_order,
            "testCases": test_cases
        }));
    }
    Ok(out)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignment.create" => Some(handle_assignment_create(state, req)),
        "assignments.list" => Some(handle_assignments_list(state, req)),
        "assignment.get" => Some(handle_assignment_get(state, req)),
        _ => None,
    }
}
