use crate::ipc::error::{respond, HandlerResult};
use crate::ipc::helpers::{gradebook, required_str, to_json};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_assignment(state: &AppState, req: &Request) -> HandlerResult {
    let assignment = required_str(&req.params, "assignment")?;
    let gb = gradebook(state)?;
    Ok(json!({
        "assignment": assignment,
        "averageScore": gb.average_assignment_score(assignment)?,
        "averageCodeScore": gb.average_assignment_code_score(assignment)?,
        "averageWrittenScore": gb.average_assignment_written_score(assignment)?,
    }))
}

fn handle_notebook(state: &AppState, req: &Request) -> HandlerResult {
    let notebook = required_str(&req.params, "notebook")?;
    let assignment = required_str(&req.params, "assignment")?;
    let gb = gradebook(state)?;
    Ok(json!({
        "assignment": assignment,
        "notebook": notebook,
        "averageScore": gb.average_notebook_score(notebook, assignment)?,
        "averageCodeScore": gb.average_notebook_code_score(notebook, assignment)?,
        "averageWrittenScore": gb.average_notebook_written_score(notebook, assignment)?,
    }))
}

fn handle_student_dicts(state: &AppState) -> HandlerResult {
    let rows = gradebook(state)?.student_dicts()?;
    Ok(json!({ "students": to_json(&rows)? }))
}

fn handle_submission_dicts(state: &AppState, req: &Request) -> HandlerResult {
    let assignment = required_str(&req.params, "assignment")?;
    let rows = gradebook(state)?.submission_dicts(assignment)?;
    Ok(json!({ "submissions": to_json(&rows)? }))
}

fn handle_notebook_submission_dicts(state: &AppState, req: &Request) -> HandlerResult {
    let notebook = required_str(&req.params, "notebook")?;
    let assignment = required_str(&req.params, "assignment")?;
    let rows = gradebook(state)?.notebook_submission_dicts(notebook, assignment)?;
    Ok(json!({ "submittedNotebooks": to_json(&rows)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "stats.assignment" => handle_assignment(state, req),
        "stats.notebook" => handle_notebook(state, req),
        "stats.studentDicts" => handle_student_dicts(state),
        "stats.submissionDicts" => handle_submission_dicts(state, req),
        "stats.notebookSubmissionDicts" => handle_notebook_submission_dicts(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
