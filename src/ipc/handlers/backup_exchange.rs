use crate::backup;
use crate::error::GradebookError;
use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::handlers::core::open_workspace;
use crate::ipc::helpers::{gradebook, optional_str, required_str};
use crate::ipc::types::{AppState, Request};
use crate::models::StudentFields;
use serde_json::json;
use std::path::PathBuf;
use tracing::{info, warn};

const STUDENT_COLUMNS: [&str; 4] = ["id", "first_name", "last_name", "email"];

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Splits CSV text into records, each tagged with the line it starts on.
/// Quoted fields may contain commas, doubled quotes and line breaks.
fn parse_csv(text: &str) -> Vec<(usize, Vec<String>)> {
    let mut records = Vec::new();
    let mut fields: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut start = 1usize;
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                buf.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => fields.push(std::mem::take(&mut buf)),
            '\r' if !in_quotes && chars.peek() == Some(&'\n') => {}
            '\n' if !in_quotes => {
                fields.push(std::mem::take(&mut buf));
                records.push((start, std::mem::take(&mut fields)));
                line += 1;
                start = line;
            }
            '\n' => {
                buf.push(ch);
                line += 1;
            }
            _ => buf.push(ch),
        }
    }
    if !buf.is_empty() || !fields.is_empty() {
        fields.push(buf);
        records.push((start, fields));
    }
    records
}

fn is_blank(fields: &[String]) -> bool {
    fields.iter().all(|f| f.trim().is_empty())
}

/// Column positions of the student fields in a header row. `id` is required.
fn student_header(header: &[String]) -> Result<[Option<usize>; 4], HandlerErr> {
    let mut positions = [None; 4];
    for (i, name) in header.iter().enumerate() {
        let name = name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase();
        if let Some(slot) = STUDENT_COLUMNS.iter().position(|c| *c == name) {
            positions[slot] = Some(i);
        }
    }
    if positions[0].is_none() {
        return Err(HandlerErr::bad_params("CSV header must contain an id column")
            .with_details(json!({ "header": header })));
    }
    Ok(positions)
}

fn cell(fields: &[String], pos: Option<usize>) -> Option<Option<String>> {
    let raw = fields.get(pos?)?.trim();
    if raw.is_empty() {
        Some(None)
    } else {
        Some(Some(raw.to_string()))
    }
}

fn handle_students_import_csv(state: &AppState, req: &Request) -> HandlerResult {
    let path = required_str(&req.params, "path")?;
    let gb = gradebook(state)?;
    let text = std::fs::read_to_string(path).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": path }))
    })?;

    let mut records = parse_csv(&text).into_iter().filter(|(_, f)| !is_blank(f));
    let Some((_, header)) = records.next() else {
        return Err(HandlerErr::bad_params("CSV file is empty"));
    };
    let positions = student_header(&header)?;

    let mut created = 0usize;
    let mut updated = 0usize;
    let mut errors = Vec::new();
    for (line_no, fields) in records {
        let Some(Some(id)) = cell(&fields, positions[0]) else {
            errors.push(json!({
                "line": line_no,
                "code": "missing_id",
                "message": "row has no student id",
            }));
            continue;
        };
        let student = StudentFields {
            first_name: cell(&fields, positions[1]),
            last_name: cell(&fields, positions[2]),
            email: cell(&fields, positions[3]),
        };
        let exists = match gb.find_student(&id) {
            Ok(_) => true,
            Err(GradebookError::MissingEntry(_)) => false,
            Err(e) => return Err(e.into()),
        };
        match gb.update_or_create_student(&id, &student) {
            Ok(_) if exists => updated += 1,
            Ok(_) => created += 1,
            Err(e) => errors.push(json!({
                "line": line_no,
                "code": e.code(),
                "message": e.to_string(),
            })),
        }
    }
    if !errors.is_empty() {
        warn!(path, errors = errors.len(), "student CSV import had row errors");
    }
    info!(path, created, updated, "imported students CSV");
    Ok(json!({ "created": created, "updated": updated, "errors": errors }))
}

fn handle_students_export_csv(state: &AppState, req: &Request) -> HandlerResult {
    let path = required_str(&req.params, "path")?;
    let students = gradebook(state)?.students()?;

    let mut out = String::from("id,first_name,last_name,email,score,max_score\n");
    for s in &students {
        let row = [
            csv_quote(&s.id),
            csv_quote(s.first_name.as_deref().unwrap_or("")),
            csv_quote(s.last_name.as_deref().unwrap_or("")),
            csv_quote(s.email.as_deref().unwrap_or("")),
            s.score.to_string(),
            s.max_score.to_string(),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    std::fs::write(path, out).map_err(|e| {
        HandlerErr::new("io_failed", e.to_string()).with_details(json!({ "path": path }))
    })?;
    Ok(json!({ "path": path, "rowsExported": students.len() }))
}

fn workspace_path(state: &AppState, req: &Request) -> Result<PathBuf, HandlerErr> {
    optional_str(&req.params, "workspacePath")
        .map(PathBuf::from)
        .or_else(|| state.workspace.clone())
        .ok_or_else(|| HandlerErr::new("no_workspace", "select a workspace first"))
}

fn handle_backup_export_workspace_bundle(state: &AppState, req: &Request) -> HandlerResult {
    let out_path = required_str(&req.params, "outPath")?.trim();
    let workspace_path = workspace_path(state, req)?;

    let export = backup::export_workspace_bundle(&workspace_path, &PathBuf::from(out_path))
        .map_err(|e| {
            HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": out_path }))
        })?;
    info!(path = out_path, "exported workspace bundle");
    Ok(json!({
        "path": out_path,
        "bundleFormat": export.bundle_format,
        "entryCount": export.entry_count,
        "dbSha256": export.db_sha256,
    }))
}

fn handle_backup_import_workspace_bundle(state: &mut AppState, req: &Request) -> HandlerResult {
    let in_path = required_str(&req.params, "inPath")?.trim();
    let workspace_path = workspace_path(state, req)?;

    let src = PathBuf::from(in_path);
    if !src.is_file() {
        return Err(HandlerErr::new("not_found", "bundle file not found")
            .with_details(json!({ "path": in_path })));
    }

    // The open handle must be dropped before its file is replaced.
    let replacing_open = state.gradebook.is_some()
        && state.workspace.as_deref() == Some(workspace_path.as_path());
    if replacing_open {
        state.gradebook = None;
    }

    let imported = backup::import_workspace_bundle(&src, &workspace_path);
    // A failed import leaves the database file untouched, so reopen either way.
    let reopened = if replacing_open {
        open_workspace(state, &workspace_path)
    } else {
        Ok(())
    };
    let import = imported.map_err(|e| {
        warn!(path = in_path, "workspace bundle import failed: {e:#}");
        HandlerErr::new("io_failed", format!("{e:#}")).with_details(json!({ "path": in_path }))
    })?;
    reopened.map_err(|e| HandlerErr::new("db_open_failed", format!("{e:#}")))?;
    info!(path = in_path, format = %import.bundle_format_detected, "imported workspace bundle");
    Ok(json!({
        "workspacePath": workspace_path.to_string_lossy(),
        "bundleFormatDetected": import.bundle_format_detected,
        "dbBytes": import.db_bytes,
    }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.importCsv" => handle_students_import_csv(state, req),
        "students.exportCsv" => handle_students_export_csv(state, req),
        "backup.exportWorkspaceBundle" => handle_backup_export_workspace_bundle(state, req),
        "backup.importWorkspaceBundle" => handle_backup_import_workspace_bundle(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_fields_keep_commas_and_quotes() {
        let recs = parse_csv("s1,\"Hacker, Alyssa\",\"say \"\"hi\"\"\",x\n");
        assert_eq!(recs, [(1, vec!["s1".to_string(), "Hacker, Alyssa".into(), "say \"hi\"".into(), "x".into()])]);
        assert_eq!(csv_quote("a,b"), "\"a,b\"");
        assert_eq!(csv_quote("plain"), "plain");
    }

    #[test]
    fn quoted_line_breaks_stay_in_one_record() {
        let original = "Line one\nline two";
        let text = format!(
            "id,last_name\r\ns1,{}\r\n\r\ns2,Bitdiddle",
            csv_quote(original)
        );
        let recs = parse_csv(&text);
        assert_eq!(recs.len(), 4);
        assert_eq!(recs[1], (2, vec!["s1".to_string(), original.to_string()]));
        assert!(is_blank(&recs[2].1));
        assert_eq!(recs[3], (5, vec!["s2".to_string(), "Bitdiddle".to_string()]));
    }

    #[test]
    fn header_requires_id() {
        let header: Vec<String> = ["\u{feff}ID", "email"].iter().map(|s| s.to_string()).collect();
        let positions = student_header(&header).expect("header");
        assert_eq!(positions, [Some(0), None, None, Some(1)]);
        let no_id: Vec<String> = vec!["email".to_string()];
        assert!(student_header(&no_id).is_err());
    }
}
