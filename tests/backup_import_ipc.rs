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
fn failed_bundle_import_keeps_workspace_open() {
    let workspace = temp_dir("gradebook-import-fail");
    let junk = workspace.join("junk.gradebook.zip");
    std::fs::write(&junk, b"PK\x03\x04not really a zip").expect("write junk bundle");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, r) = (&mut stdin, &mut reader);

    request_ok(si, r, "1", "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    request_ok(si, r, "2", "students.add", json!({ "studentId": "hacker123", "lastName": "Hacker" }));

    let code = request_err(
        si,
        r,
        "3",
        "backup.importWorkspaceBundle",
        json!({ "inPath": junk.to_string_lossy() }),
    );
    assert_eq!(code, "io_failed");

    let students = request_ok(si, r, "4", "students.list", json!({}));
    assert_eq!(students["students"][0]["id"], json!("hacker123"));
    request_ok(si, r, "5", "students.add", json!({ "studentId": "bitdiddle" }));

    let health = request_ok(si, r, "6", "health", json!({}));
    assert_eq!(health["workspacePath"], json!(workspace.to_string_lossy()));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn bundle_roundtrip_restores_students() {
    let workspace = temp_dir("gradebook-import-ok");
    let bundle = workspace.join("backup.gradebook.zip");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, r) = (&mut stdin, &mut reader);

    request_ok(si, r, "1", "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    request_ok(si, r, "2", "students.add", json!({ "studentId": "hacker123" }));
    request_ok(
        si,
        r,
        "3",
        "backup.exportWorkspaceBundle",
        json!({ "outPath": bundle.to_string_lossy() }),
    );
    request_ok(si, r, "4", "students.add", json!({ "studentId": "bitdiddle" }));
    request_ok(
        si,
        r,
        "5",
        "backup.importWorkspaceBundle",
        json!({ "inPath": bundle.to_string_lossy() }),
    );

    let students = request_ok(si, r, "6", "students.list", json!({}));
    assert_eq!(students["students"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(students["students"][0]["id"], json!("hacker123"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}

#[test]
fn students_csv_roundtrip_keeps_line_breaks() {
    let workspace = temp_dir("gradebook-students-csv");
    let csv_path = workspace.join("students.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let (si, r) = (&mut stdin, &mut reader);

    request_ok(si, r, "1", "workspace.select", json!({ "path": workspace.to_string_lossy() }));
    request_ok(
        si,
        r,
        "2",
        "students.add",
        json!({ "studentId": "hacker123", "firstName": "Alyssa, P.", "lastName": "Hacker\nJr" }),
    );
    request_ok(si, r, "3", "students.exportCsv", json!({ "path": csv_path.to_string_lossy() }));

    let imported = request_ok(si, r, "4", "students.importCsv", json!({ "path": csv_path.to_string_lossy() }));
    assert_eq!(imported["created"], json!(0));
    assert_eq!(imported["updated"], json!(1));
    assert_eq!(imported["errors"], json!([]));

    let student = request_ok(si, r, "5", "students.find", json!({ "studentId": "hacker123" }));
    assert_eq!(student["first_name"], json!("Alyssa, P."));
    assert_eq!(student["last_name"], json!("Hacker\nJr"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
