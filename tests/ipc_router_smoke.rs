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
    if value.get("ok").and_then(|v| v.as_bool()) == Some(false) {
        let code = value
            .get("error")
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        assert_ne!(
            code, "not_implemented",
            "unexpected unknown method for {}",
            method
        );
    }
    value
}

fn error_code(value: &serde_json::Value) -> Option<&str> {
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|v| v.as_str())
}

#[test]
fn router_dispatch_smoke_covers_handler_families() {
    let workspace = temp_dir("gradebook-router-smoke");
    let bundle_out = workspace.join("smoke-backup.gradebook.zip");
    let csv_out = workspace.join("smoke-students.csv");

    let (mut child, mut stdin, mut reader) = spawn_sidecar();

    let before = request(&mut stdin, &mut reader, "0", "students.list", json!({}));
    assert_eq!(error_code(&before), Some("no_workspace"));

    let _ = request(&mut stdin, &mut reader, "1", "health", json!({}));
    let _ = request(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let calls = [
        ("3", "students.add", json!({ "studentId": "s1", "lastName": "Smoke" })),
        ("4", "students.find", json!({ "studentId": "s1" })),
        ("5", "students.updateOrCreate", json!({ "studentId": "s1", "email": null })),
        ("6", "students.list", json!({})),
        ("7", "assignments.add", json!({ "assignment": "ps1", "duedate": "2024-01-01T00:00:00Z" })),
        ("8", "assignments.updateOrCreate", json!({ "assignment": "ps1" })),
        ("9", "assignments.find", json!({ "assignment": "ps1" })),
        ("10", "assignments.list", json!({})),
        ("11", "assignments.syncNotebooks", json!({ "assignment": "ps1", "notebooks": ["p1"] })),
        ("12", "notebooks.add", json!({ "notebook": "p2", "assignment": "ps1" })),
        ("13", "notebooks.updateOrCreate", json!({ "notebook": "p2", "assignment": "ps1", "kernelspec": "python3" })),
        ("14", "notebooks.find", json!({ "notebook": "p2", "assignment": "ps1" })),
        ("15", "notebooks.list", json!({ "assignment": "ps1" })),
        ("16", "notebooks.remove", json!({ "notebook": "p2", "assignment": "ps1" })),
        ("17", "notebooks.syncCells", json!({
            "notebook": "p1",
            "assignment": "ps1",
            "gradeCells": [{ "name": "t1", "maxScore": 1, "cellType": "code" }],
            "solutionCells": ["s1"],
        })),
        ("18", "gradeCells.add", json!({ "cell": "t2", "notebook": "p1", "assignment": "ps1", "maxScore": 2, "cellType": "markdown" })),
        ("19", "gradeCells.updateOrCreate", json!({ "cell": "t2", "notebook": "p1", "assignment": "ps1", "maxScore": 3 })),
        ("20", "gradeCells.find", json!({ "cell": "t2", "notebook": "p1", "assignment": "ps1" })),
        ("21", "gradeCells.list", json!({ "notebook": "p1", "assignment": "ps1" })),
        ("22", "gradeCells.remove", json!({ "cell": "t2", "notebook": "p1", "assignment": "ps1" })),
        ("23", "solutionCells.add", json!({ "cell": "s2", "notebook": "p1", "assignment": "ps1" })),
        ("24", "solutionCells.updateOrCreate", json!({ "cell": "s2", "notebook": "p1", "assignment": "ps1" })),
        ("25", "solutionCells.find", json!({ "cell": "s2", "notebook": "p1", "assignment": "ps1" })),
        ("26", "solutionCells.list", json!({ "notebook": "p1", "assignment": "ps1" })),
        ("27", "solutionCells.remove", json!({ "cell": "s2", "notebook": "p1", "assignment": "ps1" })),
        ("28", "sourceCells.add", json!({ "cell": "src", "notebook": "p1", "assignment": "ps1", "cellType": "code", "source": "x = 1" })),
        ("29", "sourceCells.updateOrCreate", json!({ "cell": "src", "notebook": "p1", "assignment": "ps1", "locked": true })),
        ("30", "sourceCells.find", json!({ "cell": "src", "notebook": "p1", "assignment": "ps1" })),
        ("31", "sourceCells.list", json!({ "notebook": "p1", "assignment": "ps1" })),
        ("32", "sourceCells.remove", json!({ "cell": "src", "notebook": "p1", "assignment": "ps1" })),
        ("33", "submissions.add", json!({ "assignment": "ps1", "studentId": "s1", "timestamp": "2024-01-01T01:00:00Z" })),
        ("34", "submissions.updateOrCreate", json!({ "assignment": "ps1", "studentId": "s1", "extension": 600 })),
        ("35", "submissions.find", json!({ "assignment": "ps1", "studentId": "s1" })),
        ("36", "submissions.listByAssignment", json!({ "assignment": "ps1" })),
        ("37", "submissions.listByStudent", json!({ "studentId": "s1" })),
        ("38", "submittedNotebooks.find", json!({ "notebook": "p1", "assignment": "ps1", "studentId": "s1" })),
        ("39", "submittedNotebooks.updateOrCreate", json!({ "notebook": "p1", "assignment": "ps1", "studentId": "s1", "flagged": true })),
        ("40", "submittedNotebooks.list", json!({ "notebook": "p1", "assignment": "ps1" })),
        ("41", "grades.list", json!({ "notebook": "p1", "assignment": "ps1", "studentId": "s1" })),
        ("42", "grades.find", json!({ "cell": "t1", "notebook": "p1", "assignment": "ps1", "studentId": "s1" })),
        ("43", "comments.list", json!({ "notebook": "p1", "assignment": "ps1", "studentId": "s1" })),
        ("44", "comments.find", json!({ "cell": "s1", "notebook": "p1", "assignment": "ps1", "studentId": "s1" })),
        ("45", "stats.assignment", json!({ "assignment": "ps1" })),
        ("46", "stats.notebook", json!({ "notebook": "p1", "assignment": "ps1" })),
        ("47", "stats.studentDicts", json!({})),
        ("48", "stats.submissionDicts", json!({ "assignment": "ps1" })),
        ("49", "stats.notebookSubmissionDicts", json!({ "notebook": "p1", "assignment": "ps1" })),
        ("50", "students.exportCsv", json!({ "path": csv_out.to_string_lossy() })),
        ("51", "students.importCsv", json!({ "path": csv_out.to_string_lossy() })),
        ("52", "backup.exportWorkspaceBundle", json!({ "outPath": bundle_out.to_string_lossy() })),
        ("53", "backup.importWorkspaceBundle", json!({ "inPath": bundle_out.to_string_lossy() })),
    ];
    for (id, method, params) in calls {
        let resp = request(&mut stdin, &mut reader, id, method, params);
        assert_eq!(
            resp.get("ok").and_then(|v| v.as_bool()),
            Some(true),
            "{method} failed: {resp}"
        );
    }

    let sn = request(
        &mut stdin,
        &mut reader,
        "54",
        "submittedNotebooks.find",
        json!({ "notebook": "p1", "assignment": "ps1", "studentId": "s1" }),
    );
    let sn_id = sn["result"]["id"].as_str().expect("submitted notebook id").to_string();
    let by_id = request(
        &mut stdin,
        &mut reader,
        "55",
        "submittedNotebooks.findById",
        json!({ "id": sn_id }),
    );
    assert_eq!(by_id["result"]["flagged"], json!(true));

    let grade = request(
        &mut stdin,
        &mut reader,
        "56",
        "grades.find",
        json!({ "cell": "t1", "notebook": "p1", "assignment": "ps1", "studentId": "s1" }),
    );
    let grade_id = grade["result"]["id"].as_str().expect("grade id").to_string();
    let _ = request(&mut stdin, &mut reader, "57", "grades.findById", json!({ "id": grade_id }));
    let _ = request(
        &mut stdin,
        &mut reader,
        "58",
        "grades.update",
        json!({ "id": grade_id, "manualScore": 1 }),
    );
    let comment = request(
        &mut stdin,
        &mut reader,
        "59",
        "comments.find",
        json!({ "cell": "s1", "notebook": "p1", "assignment": "ps1", "studentId": "s1" }),
    );
    let comment_id = comment["result"]["id"].as_str().expect("comment id").to_string();
    let _ = request(&mut stdin, &mut reader, "60", "comments.findById", json!({ "id": comment_id }));
    let _ = request(
        &mut stdin,
        &mut reader,
        "61",
        "comments.update",
        json!({ "id": comment_id, "manualComment": "ok" }),
    );

    let _ = request(
        &mut stdin,
        &mut reader,
        "62",
        "submittedNotebooks.remove",
        json!({ "notebook": "p1", "assignment": "ps1", "studentId": "s1" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "63",
        "submittedNotebooks.add",
        json!({ "notebook": "p1", "assignment": "ps1", "studentId": "s1" }),
    );
    let _ = request(
        &mut stdin,
        &mut reader,
        "64",
        "submissions.remove",
        json!({ "assignment": "ps1", "studentId": "s1" }),
    );
    let _ = request(&mut stdin, &mut reader, "65", "assignments.remove", json!({ "assignment": "ps1" }));
    let _ = request(&mut stdin, &mut reader, "66", "students.remove", json!({ "studentId": "s1" }));

    writeln!(stdin, "{}", json!({ "id": "67", "method": "nope.nothing" })).expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let unknown: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(error_code(&unknown), Some("not_implemented"));

    writeln!(stdin, "not json").expect("write");
    stdin.flush().expect("flush");
    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    let bad: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response");
    assert_eq!(error_code(&bad), Some("bad_json"));

    drop(stdin);
    let _ = child.wait();
    let _ = std::fs::remove_dir_all(workspace);
}
