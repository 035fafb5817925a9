use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_courseworkd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn courseworkd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn import_error(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    document: serde_json::Value,
) -> serde_json::Value {
    let raw = request(
        stdin,
        reader,
        id,
        "assignment.import",
        json!({ "teacher": "turing", "document": document }),
    );
    assert_eq!(
        raw.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "import unexpectedly succeeded: {}",
        raw
    );
    raw.get("error").cloned().expect("error object")
}

fn setup(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>, workspace: &PathBuf) {
    let _ = request_ok(
        stdin,
        reader,
        "ws",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "teacher",
        "user.create",
        json!({ "username": "turing", "role": "TEACHER" }),
    );
}

#[test]
fn missing_fields_are_named_with_their_scope() {
    let workspace = temp_dir("coursework-validation-missing");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    let error = import_error(&mut stdin, &mut reader, "no-title", json!({ "tasks": [] }));
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some("validation_missing_field")
    );
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("Missing required field: title")
    );
    assert_eq!(
        error.pointer("/details/stage").and_then(|v| v.as_str()),
        Some("validation")
    );

    let error = import_error(
        &mut stdin,
        &mut reader,
        "no-desc",
        json!({ "title": "HW1", "tasks": [{ "title": "T1" }] }),
    );
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("Task 1: Missing required field 'description'")
    );

    let error = import_error(
        &mut stdin,
        &mut reader,
        "no-expected",
        json!({
            "title": "HW1",
            "tasks": [{
                "title": "T1",
                "description": "d",
                "test_cases": [{ "input_data": "x" }]
            }]
        }),
    );
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("Task 1, Test Case 1: Missing required field 'expected_output'")
    );
}

#[test]
fn shape_violations_are_rejected() {
    let workspace = temp_dir("coursework-validation-shape");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    let error = import_error(
        &mut stdin,
        &mut reader,
        "tasks-not-list",
        json!({ "title": "HW1", "tasks": "T1" }),
    );
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some("validation_invalid_shape")
    );
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("'tasks' must be a list")
    );

    let error = import_error(
        &mut stdin,
        &mut reader,
        "tasks-empty",
        json!({ "title": "HW1", "tasks": [] }),
    );
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("Assignment must have at least one task")
    );

    let error = import_error(
        &mut stdin,
        &mut reader,
        "test-cases-not-list",
        json!({
            "title": "HW1",
            "tasks": [{ "title": "T1", "description": "d", "test_cases": "oops" }]
        }),
    );
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("Task 1: 'test_cases' must be a list")
    );
}

#[test]
fn enum_violations_name_value_and_allowed_set() {
    let workspace = temp_dir("coursework-validation-enum");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    let error = import_error(
        &mut stdin,
        &mut reader,
        "bad-task-type",
        json!({
            "title": "HW1",
            "tasks": [{ "title": "T1", "description": "d", "task_type": "ESSAY" }]
        }),
    );
    assert_eq!(
        error.get("code").and_then(|v| v.as_str()),
        Some("validation_invalid_enum")
    );
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("Task 1: Invalid task_type 'ESSAY'. Must be one of: DESCRIPTION_ONLY, CODING")
    );

    let error = import_error(
        &mut stdin,
        &mut reader,
        "bad-validation-type",
        json!({
            "title": "HW1",
            "tasks": [{ "title": "T1", "description": "d", "validation_type": "PEER" }]
        }),
    );
    assert_eq!(
        error.get("message").and_then(|v| v.as_str()),
        Some("Task 1: Invalid validation_type 'PEER'. Must be one of: MANUAL, AUTO")
    );
}

#[test]
fn bad_datetimes_are_rejected_and_rejection_is_repeatable() {
    let workspace = temp_dir("coursework-validation-datetime");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    setup(&mut stdin, &mut reader, &workspace);

    let doc = json!({
        "title": "HW1",
        "start_time": "next tuesday",
        "tasks": [{ "title": "T1", "description": "d" }]
    });

    let first = import_error(&mut stdin, &mut reader, "dt-1", doc.clone());
    assert_eq!(
        first.get("code").and_then(|v| v.as_str()),
        Some("validation_invalid_datetime")
    );
    assert_eq!(
        first.get("message").and_then(|v| v.as_str()),
        Some("Invalid datetime format: next tuesday. Use ISO format (e.g., 2026-02-15T10:00:00Z)")
    );

    // Same document, same verdict; validation holds no state.
    let second = import_error(&mut stdin, &mut reader, "dt-2", doc);
    assert_eq!(first.get("code"), second.get("code"));
    assert_eq!(first.get("message"), second.get("message"));

    // Nothing was created along the way.
    let list = request_ok(
        &mut stdin,
        &mut reader,
        "list",
        "assignments.list",
        json!({ "teacher": "turing" }),
    );
    assert_eq!(
        list.get("assignments").and_then(|v| v.as_array()).map(Vec::len),
        Some(0)
    );
}
