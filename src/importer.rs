use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{Connection, Transaction};
use serde_json::{json, Value};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::users::User;

pub const TASK_TYPES: &[&str] = &["DESCRIPTION_ONLY", "CODING"];
pub const VALIDATION_TYPES: &[&str] = &["MANUAL", "AUTO"];

pub const DEFAULT_TASK_TYPE: &str = "CODING";
pub const DEFAULT_VALIDATION_TYPE: &str = "MANUAL";

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("Error reading file: {message}")]
    FileRead { path: PathBuf, message: String },
    #[error("File must be UTF-8 encoded")]
    BadEncoding,
    #[error("Invalid JSON format: {0}")]
    BadJson(String),
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("'{field}' must be {expected}")]
    BadShape {
        field: &'static str,
        expected: &'static str,
    },
    #[error("Assignment must have at least one task")]
    NoTasks,
    #[error("Task {0}: must be an object")]
    TaskNotAnObject(usize),
    #[error("Task {task}: Missing required field '{field}'")]
    TaskMissingField { task: usize, field: &'static str },
    #[error("Task {task}: '{field}' must be {expected}")]
    TaskBadShape {
        task: usize,
        field: &'static str,
        expected: &'static str,
    },
    #[error("Task {task}: Invalid {field} '{value}'. Must be one of: {}", .allowed.join(", "))]
    BadEnum {
        task: usize,
        field: &'static str,
        value: String,
        allowed: &'static [&'static str],
    },
    #[error("Task {task}, Test Case {test_case}: must be an object")]
    TestCaseNotAnObject { task: usize, test_case: usize },
    #[error("Task {task}, Test Case {test_case}: Missing required field '{field}'")]
    TestCaseMissingField {
        task: usize,
        test_case: usize,
        field: &'static str,
    },
    #[error("Task {task}, Test Case {test_case}: '{field}' must be {expected}")]
    TestCaseBadShape {
        task: usize,
        test_case: usize,
        field: &'static str,
        expected: &'static str,
    },
    #[error("Invalid datetime format: {value}. Use ISO format (e.g., 2026-02-15T10:00:00Z)")]
    BadDateTime {
        field: &'static str,
        value: String,
    },
    #[error("User {0} is not a teacher")]
    NotATeacher(String),
    #[error("Import transaction failed: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl ImportError {
    /// Stable machine code for the IPC error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ImportError::FileNotFound(_) => "source_not_found",
            ImportError::FileRead { .. } => "source_read_failed",
            ImportError::BadEncoding => "source_encoding",
            ImportError::BadJson(_) => "source_malformed",
            ImportError::MissingField(_)
            | ImportError::TaskMissingField { .. }
            | ImportError::TestCaseMissingField { .. } => "validation_missing_field",
            ImportError::BadShape { .. }
            | ImportError::NoTasks
            | ImportError::TaskNotAnObject(_)
            | ImportError::TaskBadShape { .. }
            | ImportError::TestCaseNotAnObject { .. }
            | ImportError::TestCaseBadShape { .. } => "validation_invalid_shape",
            ImportError::BadEnum { .. } => "validation_invalid_enum",
            ImportError::BadDateTime { .. } => "validation_invalid_datetime",
            ImportError::NotATeacher(_) => "not_a_teacher",
            ImportError::Storage(_) => "import_failed",
        }
    }

    /// Which pipeline stage produced the failure.
    pub fn stage(&self) -> &'static str {
        match self {
            ImportError::FileNotFound(_)
            | ImportError::FileRead { .. }
            | ImportError::BadEncoding
            | ImportError::BadJson(_) => "source",
            ImportError::NotATeacher(_) => "authorization",
            ImportError::Storage(_) => "storage",
            _ => "validation",
        }
    }

    /// Structured context for programmatic callers; the message alone is for
    /// people.
    pub fn details(&self) -> Value {
        let mut d = json!({ "stage": self.stage() });
        match self {
            ImportError::FileNotFound(path) | ImportError::FileRead { path, .. } => {
                d["path"] = json!(path.to_string_lossy());
            }
            ImportError::MissingField(field) | ImportError::BadShape { field, .. } => {
                d["field"] = json!(field);
            }
            ImportError::TaskNotAnObject(task) => {
                d["task"] = json!(task);
            }
            ImportError::TaskMissingField { task, field }
            | ImportError::TaskBadShape { task, field, .. } => {
                d["task"] = json!(task);
                d["field"] = json!(field);
            }
            ImportError::BadEnum {
                task,
                field,
                value,
                allowed,
            } => {
                d["task"] = json!(task);
                d["field"] = json!(field);
                d["value"] = json!(value);
                d["allowed"] = json!(allowed);
            }
            ImportError::TestCaseNotAnObject { task, test_case } => {
                d["task"] = json!(task);
                d["testCase"] = json!(test_case);
            }
            ImportError::TestCaseMissingField {
                task,
                test_case,
                field,
            }
            | ImportError::TestCaseBadShape {
                task,
                test_case,
                field,
                ..
            } => {
                d["task"] = json!(task);
                d["testCase"] = json!(test_case);
                d["field"] = json!(field);
            }
            ImportError::BadDateTime { field, value } => {
                d["field"] = json!(field);
                d["value"] = json!(value);
            }
            _ => {}
        }
        d
    }
}

/// A point in time as the document gave it: offset-aware values keep their
/// explicit offset, naive values stay naive (no zone is ever inferred).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Timestamp {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl Timestamp {
    pub fn parse(field: &'static str, raw: &str) -> Result<Timestamp, ImportError> {
        // A literal trailing Z is an explicit zero offset.
        let candidate = match raw.strip_suffix('Z') {
            Some(rest) => format!("{rest}+00:00"),
            None => raw.to_string(),
        };

        if let Ok(t) = DateTime::parse_from_rfc3339(&candidate) {
            return Ok(Timestamp::Zoned(t));
        }
        if let Ok(t) = candidate.parse::<NaiveDateTime>() {
            return Ok(Timestamp::Naive(t));
        }
        if let Ok(t) = NaiveDateTime::parse_from_str(&candidate, "%Y-%m-%d %H:%M:%S%.f") {
            return Ok(Timestamp::Naive(t));
        }
        if let Ok(d) = NaiveDate::parse_from_str(&candidate, "%Y-%m-%d") {
            return Ok(Timestamp::Naive(d.and_time(NaiveTime::MIN)));
        }

        Err(ImportError::BadDateTime {
            field,
            value: raw.to_string(),
        })
    }

    pub fn as_naive_utc(&self) -> NaiveDateTime {
        match self {
            Timestamp::Zoned(t) => t.naive_utc(),
            Timestamp::Naive(t) => *t,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Zoned(t) => f.write_str(&t.to_rfc3339()),
            Timestamp::Naive(t) => write!(f, "{}", t.format("%Y-%m-%dT%H:%M:%S%.f")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportDocument {
    pub title: String,
    pub description: String,
    pub start_time: Option<Timestamp>,
    pub end_time: Option<Timestamp>,
    pub tasks: Vec<TaskSpec>,
}

#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub title: String,
    pub description: String,
    pub task_type: String,
    pub validation_type: String,
    pub order: i64,
    pub test_cases: Vec<TestCaseSpec>,
}

#[derive(Debug, Clone)]
pub struct TestCaseSpec {
    pub input_data: String,
    pub expected_output: String,
}

#[derive(Debug, Clone)]
pub struct ImportOutcome {
    pub assignment_id: String,
    pub title: String,
    pub tasks: Vec<TaskOutcome>,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub task_id: String,
    pub title: String,
    pub test_cases: usize,
}

fn enum_repr(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn required_nonempty_str(v: &Value) -> Option<&str> {
    v.as_str().filter(|s| !s.is_empty())
}

/// Structural validation of a parsed document. Pure; the first violation
/// found is reported, with 1-based task and test-case indices.
pub fn validate_structure(data: &Value) -> Result<(), ImportError> {
    if !data.is_object() {
        return Err(ImportError::BadShape {
            field: "document",
            expected: "an object",
        });
    }

    for field in ["title", "tasks"] {
        if data.get(field).is_none() {
            return Err(ImportError::MissingField(field));
        }
    }

    if required_nonempty_str(&data["title"]).is_none() {
        return Err(ImportError::BadShape {
            field: "title",
            expected: "a non-empty string",
        });
    }
    for field in ["description", "start_time", "end_time"] {
        if let Some(v) = data.get(field) {
            if !v.is_null() && !v.is_string() {
                return Err(ImportError::BadShape {
                    field,
                    expected: "a string",
                });
            }
        }
    }

    let Some(tasks) = data["tasks"].as_array() else {
        return Err(ImportError::BadShape {
            field: "tasks",
            expected: "a list",
        });
    };
    if tasks.is_empty() {
        return Err(ImportError::NoTasks);
    }

    for (idx, task) in tasks.iter().enumerate() {
        validate_task(task, idx + 1)?;
    }

    Ok(())
}

fn validate_task(task: &Value, task_num: usize) -> Result<(), ImportError> {
    if !task.is_object() {
        return Err(ImportError::TaskNotAnObject(task_num));
    }

    for field in ["title", "description"] {
        match task.get(field) {
            None => {
                return Err(ImportError::TaskMissingField {
                    task: task_num,
                    field,
                })
            }
            Some(v) => {
                if required_nonempty_str(v).is_none() {
                    return Err(ImportError::TaskBadShape {
                        task: task_num,
                        field,
                        expected: "a non-empty string",
                    });
                }
            }
        }
    }

    if let Some(v) = task.get("task_type") {
        if !v.as_str().is_some_and(|s| TASK_TYPES.contains(&s)) {
            return Err(ImportError::BadEnum {
                task: task_num,
                field: "task_type",
                value: enum_repr(v),
                allowed: TASK_TYPES,
            });
        }
    }

    if let Some(v) = task.get("validation_type") {
        if !v.as_str().is_some_and(|s| VALIDATION_TYPES.contains(&s)) {
            return Err(ImportError::BadEnum {
                task: task_num,
                field: "validation_type",
                value: enum_repr(v),
                allowed: VALIDATION_TYPES,
            });
        }
    }

    if let Some(v) = task.get("order") {
        if v.as_i64().is_none() {
            return Err(ImportError::TaskBadShape {
                task: task_num,
                field: "order",
                expected: "an integer",
            });
        }
    }

    if let Some(v) = task.get("test_cases") {
        let Some(test_cases) = v.as_array() else {
            return Err(ImportError::TaskBadShape {
                task: task_num,
                field: "test_cases",
                expected: "a list",
            });
        };
        for (tc_idx, test_case) in test_cases.iter().enumerate() {
            validate_test_case(test_case, task_num, tc_idx + 1)?;
        }
    }

    Ok(())
}

fn validate_test_case(test_case: &Value, task_num: usize, tc_num: usize) -> Result<(), ImportError> {
    if !test_case.is_object() {
        return Err(ImportError::TestCaseNotAnObject {
            task: task_num,
            test_case: tc_num,
        });
    }

    match test_case.get("expected_output") {
        None => {
            return Err(ImportError::TestCaseMissingField {
                task: task_num,
                test_case: tc_num,
                field: "expected_output",
            })
        }
        Some(v) => {
            // Required to be present; an empty string is fine.
            if !v.is_string() {
                return Err(ImportError::TestCaseBadShape {
                    task: task_num,
                    test_case: tc_num,
                    field: "expected_output",
                    expected: "a string",
                });
            }
        }
    }

    if let Some(v) = test_case.get("input_data") {
        if !v.is_null() && !v.is_string() {
            return Err(ImportError::TestCaseBadShape {
                task: task_num,
                test_case: tc_num,
                field: "input_data",
                expected: "a string",
            });
        }
    }

    Ok(())
}

fn timestamp_field(data: &Value, field: &'static str) -> Result<Option<Timestamp>, ImportError> {
    let Some(raw) = data.get(field).and_then(|v| v.as_str()) else {
        return Ok(None);
    };
    if raw.is_empty() {
        return Ok(None);
    }
    Timestamp::parse(field, raw).map(Some)
}

/// Build the in-memory document from an already-validated value, applying
/// defaults and normalizing the optional availability window.
pub fn build_document(data: &Value) -> Result<ImportDocument, ImportError> {
    let title = data
        .get("title")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let description = data
        .get("description")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let start_time = timestamp_field(data, "start_time")?;
    let end_time = timestamp_field(data, "end_time")?;

    let mut tasks = Vec::new();
    let raw_tasks = data
        .get("tasks")
        .and_then(|v| v.as_array())
        .map(|v| v.as_slice())
        .unwrap_or_default();
    for task in raw_tasks {
        let test_cases = task
            .get("test_cases")
            .and_then(|v| v.as_array())
            .map(|v| v.as_slice())
            .unwrap_or_default()
            .iter()
            .map(|tc| TestCaseSpec {
                input_data: tc
                    .get("input_data")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                expected_output: tc
                    .get("expected_output")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            })
            .collect();

        tasks.push(TaskSpec {
            title: task
                .get("title")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            description: task
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            task_type: task
                .get("task_type")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_TASK_TYPE)
                .to_string(),
            validation_type: task
                .get("validation_type")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_VALIDATION_TYPE)
                .to_string(),
            order: task.get("order").and_then(|v| v.as_i64()).unwrap_or(0),
            test_cases,
        });
    }

    Ok(ImportDocument {
        title,
        description,
        start_time,
        end_time,
        tasks,
    })
}

/// Imports one assignment document for one owning teacher. The teacher
/// check happens at construction, before any document is touched.
pub struct AssignmentImporter<'a> {
    conn: &'a Connection,
    teacher_id: String,
}

impl<'a> std::fmt::Debug for AssignmentImporter<'a> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentImporter")
            .field("teacher_id", &self.teacher_id)
            .finish_non_exhaustive()
    }
}

impl<'a> AssignmentImporter<'a> {
    pub fn new(conn: &'a Connection, teacher: &User) -> Result<Self, ImportError> {
        if !teacher.is_teacher() {
            return Err(ImportError::NotATeacher(teacher.username.clone()));
        }
        Ok(AssignmentImporter {
            conn,
            teacher_id: teacher.id.clone(),
        })
    }

    pub fn import_from_file(&self, path: &Path) -> Result<ImportOutcome, ImportError> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ImportError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => {
                return Err(ImportError::FileRead {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })
            }
        };
        self.import_from_bytes(&bytes)
    }

    pub fn import_from_bytes(&self, bytes: &[u8]) -> Result<ImportOutcome, ImportError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ImportError::BadEncoding)?;
        let data: Value =
            serde_json::from_str(text).map_err(|e| ImportError::BadJson(e.to_string()))?;
        self.import_from_value(&data)
    }

    pub fn import_from_value(&self, data: &Value) -> Result<ImportOutcome, ImportError> {
        validate_structure(data)?;
        let doc = build_document(data)?;
        self.materialize(&doc)
    }

    // All-or-nothing write of the validated graph.
    fn materialize(&self, doc: &ImportDocument) -> Result<ImportOutcome, ImportError> {
        let tx = self.conn.unchecked_transaction()?;
        let outcome = match write_graph(&tx, &self.teacher_id, doc) {
            Ok(v) => v,
            Err(e) => {
                let _ = tx.rollback();
                return Err(ImportError::Storage(e));
            }
        };
        tx.commit()?;
        Ok(outcome)
    }
}

fn write_graph(
    tx: &Transaction,
    teacher_id: &str,
    doc: &ImportDocument,
) -> rusqlite::Result<ImportOutcome> {
    let assignment_id = Uuid::new_v4().to_string();
    tx.execute(
        "INSERT INTO assignments(id, teacher_id, title, description, start_time, end_time, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?)",
        (
            &assignment_id,
            teacher_id,
            &doc.title,
            &doc.description,
            doc.start_time.map(|t| t.to_string()),
            doc.end_time.map(|t| t.to_string()),
            chrono::Utc::now().to_rfc3339(),
        ),
    )?;

    let mut tasks = Vec::new();
    for spec in &doc.tasks {
        let task_id = Uuid::new_v4().to_string();
        tx.execute(
            "INSERT INTO tasks(id, assignment_id, title, description, task_type, validation_type, sort_order)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                &task_id,
                &assignment_id,
                &spec.title,
                &spec.description,
                &spec.task_type,
                &spec.validation_type,
                spec.order,
            ),
        )?;

        for tc in &spec.test_cases {
            let tc_id = Uuid::new_v4().to_string();
            tx.execute(
                "INSERT INTO test_cases(id, task_id, input_data, expected_output)
                 VALUES(?, ?, ?, ?)",
                (&tc_id, &task_id, &tc.input_data, &tc.expected_output),
            )?;
        }

        tasks.push(TaskOutcome {
            task_id,
            title: spec.title.clone(),
            test_cases: spec.test_cases.len(),
        });
    }

    Ok(ImportOutcome {
        assignment_id,
        title: doc.title.clone(),
        tasks,
    })
}
