mod db;
mod importer;
mod ipc;
mod users;

use std::io::{self, BufRead, Write};
use std::path::Path;

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.first().map(String::as_str) == Some("import") {
        std::process::exit(run_import(&args[1..]));
    }

    run_ipc_loop();
}

// Keep this binary dependency-light for now. Use simple error mapping.
fn run_ipc_loop() {
    let mut state = ipc::AppState {
        workspace: None,
        db: None,
    };

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // Can't reply without id; ignore.
                let _ = writeln!(
                    stdout,
                    "{{\"ok\":false,\"error\":{{\"code\":\"bad_json\",\"message\":\"{}\"}}}}",
                    e
                );
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
}

const IMPORT_USAGE: &str =
    "usage: courseworkd import <file> --teacher <username> [--workspace <dir>] [--verbose]";

fn run_import(args: &[String]) -> i32 {
    let mut file: Option<String> = None;
    let mut teacher: Option<String> = None;
    let mut workspace = String::from(".");
    let mut verbose = false;

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--teacher" => {
                i += 1;
                teacher = args.get(i).cloned();
            }
            "--workspace" => {
                i += 1;
                if let Some(v) = args.get(i) {
                    workspace = v.clone();
                }
            }
            "--verbose" => verbose = true,
            other if file.is_none() && !other.starts_with("--") => {
                file = Some(other.to_string());
            }
            other => {
                eprintln!("unexpected argument: {}", other);
                eprintln!("{}", IMPORT_USAGE);
                return 2;
            }
        }
        i += 1;
    }

    let (Some(file), Some(teacher_name)) = (file, teacher) else {
        eprintln!("{}", IMPORT_USAGE);
        return 2;
    };

    let conn = match db::open_db(Path::new(&workspace)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to open workspace: {}", e);
            return 1;
        }
    };

    let user = match users::find_by_username(&conn, &teacher_name) {
        Ok(Some(u)) => u,
        Ok(None) => {
            eprintln!("User '{}' does not exist", teacher_name);
            return 1;
        }
        Err(e) => {
            eprintln!("failed to look up teacher: {}", e);
            return 1;
        }
    };

    if verbose {
        println!("Importing assignment from: {}", file);
        println!("Teacher: {}", teacher_name);
    }

    let outcome = importer::AssignmentImporter::new(&conn, &user)
        .and_then(|imp| imp.import_from_file(Path::new(&file)));

    match outcome {
        Ok(outcome) => {
            println!(
                "Successfully imported assignment: '{}' ({})",
                outcome.title, outcome.assignment_id
            );
            if verbose {
                println!("  - Tasks created: {}", outcome.tasks.len());
                for task in &outcome.tasks {
                    println!("    * {} ({} test cases)", task.title, task.test_cases);
                }
            }
            0
        }
        Err(e) => {
            eprintln!("Import failed ({}): {}", e.stage(), e);
            1
        }
    }
}
