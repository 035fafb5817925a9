use crate::importer::{AssignmentImporter, ImportError, ImportOutcome};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{acting_user, db_conn};
use crate::ipc::types::{AppState, Request};
use serde_json::json;
use std::path::Path;

enum Source {
    Path(String),
    Document(serde_json::Value),
}

fn handle_assignment_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(resp) => return resp,
    };
    let user = match acting_user(conn, req) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let source = if let Some(doc) = req.params.get("document") {
        Source::Document(doc.clone())
    } else if let Some(path) = req.params.get("path").and_then(|v| v.as_str()) {
        Source::Path(path.to_string())
    } else {
        return err(&req.id, "bad_params", "missing path or document", None);
    };

    let result: Result<ImportOutcome, ImportError> = AssignmentImporter::new(conn, &user)
        .and_then(|importer| match &source {
            Source::Path(path) => importer.import_from_file(Path::new(path)),
            Source::Document(doc) => importer.import_from_value(doc),
        });

    match result {
        Ok(outcome) => {
            let tasks: Vec<serde_json::Value> = outcome
                .tasks
                .iter()
                .map(|t| {
                    json!({
                        "taskId": t.task_id,
                        "title": t.title,
                        "testCaseCount": t.test_cases
                    })
                })
                .collect();
            ok(
                &req.id,
                json!({
                    "assignmentId": outcome.assignment_id,
                    "title": outcome.title,
                    "taskCount": outcome.tasks.len(),
                    "tasks": tasks
                }),
            )
        }
        Err(e) => err(&req.id, e.code(), e.to_string(), Some(e.details())),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "assignment.import" => Some(handle_assignment_import(state, req)),
        _ => None,
    }
}
