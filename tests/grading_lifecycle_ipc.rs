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
    let exe = env!("CARGO_BIN_EXE_gradebookd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn gradebookd");
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
        value.get("error").cloned().unwrap_or(serde_json::Value::Null)
    );
    value.get("result").cloned().unwrap_or(serde_json::Value::Null)
}

fn request_err(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded",
        method
    );
    value["error"]["code"].as_str().unwrap_or("").to_string()
}

#[test]
fn two_students_graded_through_ipc() {
    let workspace = temp_dir("gradebook-lifecycle");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, r) = (&mut stdin, &mut reader);

    request_ok(si, r, "1", "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    request_ok(si, r, "2", "assignments.add", json!({ "assignment": "foo", "duedate": "2020-01-01 12:00:00" }));
    request_ok(si, r, "3", "notebooks.add", json!({ "notebook": "p1", "assignment": "foo" }));
    request_ok(
        si,
        r,
        "4",
        "notebooks.syncCells",
        json!({
            "notebook": "p1",
            "assignment": "foo",
            "gradeCells": [
                { "name": "test1", "maxScore": 1, "cellType": "code" },
                { "name": "test2", "maxScore": 2, "cellType": "markdown" }
            ],
            "solutionCells": []
        }),
    );
    request_ok(si, r, "5", "students.add", json!({ "studentId": "hacker123", "lastName": "Hacker" }));
    request_ok(si, r, "6", "students.add", json!({ "studentId": "bitdiddle", "lastName": "Bitdiddle" }));
    let sa = request_ok(
        si,
        r,
        "7",
        "submissions.add",
        json!({ "assignment": "foo", "studentId": "hacker123", "timestamp": "2020-01-01T13:00:00Z" }),
    );
    assert_eq!(sa["total_seconds_late"], json!(3600.0));
    assert_eq!(sa["needs_manual_grade"], json!(true));
    request_ok(si, r, "8", "submissions.add", json!({ "assignment": "foo", "studentId": "bitdiddle" }));

    let scores = [("hacker123", 1.0, 2.0), ("bitdiddle", 0.5, 1.0)];
    let mut n = 0;
    for (student, code, written) in scores {
        for (cell, score) in [("test1", code), ("test2", written)] {
            n += 1;
            let grade = request_ok(
                si,
                r,
                &format!("g{n}"),
                "grades.find",
                json!({ "cell": cell, "notebook": "p1", "assignment": "foo", "studentId": student }),
            );
            let updated = request_ok(
                si,
                r,
                &format!("u{n}"),
                "grades.update",
                json!({ "id": grade["id"], "manualScore": score }),
            );
            assert_eq!(updated["score"], json!(score));
            assert_eq!(updated["needs_manual_grade"], json!(false));
        }
    }

    let stats = request_ok(si, r, "9", "stats.assignment", json!({ "assignment": "foo" }));
    assert_eq!(stats["averageScore"], json!(2.25));
    assert_eq!(stats["averageCodeScore"], json!(0.75));
    assert_eq!(stats["averageWrittenScore"], json!(1.5));

    let sa = request_ok(si, r, "10", "submissions.find", json!({ "assignment": "foo", "studentId": "hacker123" }));
    assert_eq!(sa["score"], json!(3.0));
    assert_eq!(sa["needs_manual_grade"], json!(false));

    // Submissions freeze the notebook and cell set.
    let code = request_err(si, r, "11", "notebooks.add", json!({ "notebook": "p2", "assignment": "foo" }));
    assert_eq!(code, "invalid_entry");
    let code = request_err(
        si,
        r,
        "12",
        "gradeCells.add",
        json!({ "cell": "test3", "notebook": "p1", "assignment": "foo", "maxScore": 1, "cellType": "code" }),
    );
    assert_eq!(code, "invalid_entry");
    let code = request_err(si, r, "13", "assignments.add", json!({ "assignment": "foo" }));
    assert_eq!(code, "invalid_entry");
    let code = request_err(si, r, "14", "assignments.find", json!({ "assignment": "bar" }));
    assert_eq!(code, "not_found");
    let code = request_err(si, r, "15", "assignments.find", json!({}));
    assert_eq!(code, "bad_params");

    let dicts = request_ok(si, r, "16", "stats.submissionDicts", json!({ "assignment": "foo" }));
    let listed = request_ok(si, r, "17", "submissions.listByAssignment", json!({ "assignment": "foo" }));
    assert_eq!(dicts["submissions"], listed["submissions"]);

    request_ok(si, r, "18", "assignments.remove", json!({ "assignment": "foo" }));
    let code = request_err(si, r, "19", "submissions.find", json!({ "assignment": "foo", "studentId": "hacker123" }));
    assert_eq!(code, "not_found");
    let students = request_ok(si, r, "20", "students.list", json!({}));
    assert_eq!(students["students"].as_array().map(|a| a.len()), Some(2));
    assert_eq!(students["students"][0]["score"], json!(0.0));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
