use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{
    gradebook, nullable_datetime, nullable_f64, optional_bool, optional_f64, optional_str,
    required_str, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{SubmissionFields, SubmittedNotebookFields};
use serde_json::{json, Value};

fn submission_fields(params: &Value) -> Result<SubmissionFields, HandlerErr> {
    Ok(SubmissionFields {
        timestamp: nullable_datetime(params, "timestamp")?,
        extension: nullable_f64(params, "extension")?,
    })
}

fn handle_submission(state: &AppState, req: &Request) -> HandlerResult {
    let assignment = required_str(&req.params, "assignment")?;
    let student = required_str(&req.params, "studentId")?;
    let gb = gradebook(state)?;
    match req.method.as_str() {
        "submissions.add" => {
            to_json(&gb.add_submission(assignment, student, &submission_fields(&req.params)?)?)
        }
        "submissions.find" => to_json(&gb.find_submission(assignment, student)?),
        "submissions.updateOrCreate" => to_json(&gb.update_or_create_submission(
            assignment,
            student,
            &submission_fields(&req.params)?,
        )?),
        _ => {
            gb.remove_submission(assignment, student)?;
            Ok(json!({ "removed": { "assignment": assignment, "studentId": student } }))
        }
    }
}

fn handle_list_by_assignment(state: &AppState, req: &Request) -> HandlerResult {
    let assignment = required_str(&req.params, "assignment")?;
    let submissions = gradebook(state)?.assignment_submissions(assignment)?;
    Ok(json!({ "submissions": to_json(&submissions)? }))
}

fn handle_list_by_student(state: &AppState, req: &Request) -> HandlerResult {
    let student = required_str(&req.params, "studentId")?;
    let submissions = gradebook(state)?.student_submissions(student)?;
    Ok(json!({ "submissions": to_json(&submissions)? }))
}

fn handle_submitted_notebook(state: &AppState, req: &Request) -> HandlerResult {
    let notebook = required_str(&req.params, "notebook")?;
    let assignment = required_str(&req.params, "assignment")?;
    let student = required_str(&req.params, "studentId")?;
    let gb = gradebook(state)?;
    match req.method.as_str() {
        "submittedNotebooks.add" => {
            to_json(&gb.add_submission_notebook(notebook, assignment, student)?)
        }
        "submittedNotebooks.find" => {
            to_json(&gb.find_submission_notebook(notebook, assignment, student)?)
        }
        "submittedNotebooks.updateOrCreate" => {
            let fields = SubmittedNotebookFields {
                flagged: optional_bool(&req.params, "flagged")?,
                late_submission_penalty: optional_f64(&req.params, "lateSubmissionPenalty")?,
            };
            to_json(&gb.update_or_create_submission_notebook(notebook, assignment, student, &fields)?)
        }
        _ => {
            gb.remove_submission_notebook(notebook, assignment, student)?;
            Ok(json!({ "removed": notebook }))
        }
    }
}

fn handle_submitted_notebook_by_id(state: &AppState, req: &Request) -> HandlerResult {
    let id = required_str(&req.params, "id")?;
    to_json(&gradebook(state)?.find_submission_notebook_by_id(id)?)
}

/// With `studentId` lists the notebooks of that student's submission,
/// otherwise every submitted copy of `notebook`.
fn handle_submitted_notebook_list(state: &AppState, req: &Request) -> HandlerResult {
    let assignment = required_str(&req.params, "assignment")?;
    let gb = gradebook(state)?;
    let notebooks = match optional_str(&req.params, "studentId") {
        Some(student) => gb.submission_notebooks(assignment, student)?,
        None => {
            let notebook = required_str(&req.params, "notebook")?;
            gb.notebook_submissions(notebook, assignment)?
        }
    };
    Ok(json!({ "submittedNotebooks": to_json(&notebooks)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "submissions.add"
        | "submissions.find"
        | "submissions.updateOrCreate"
        | "submissions.remove" => handle_submission(state, req),
        "submissions.listByAssignment" => handle_list_by_assignment(state, req),
        "submissions.listByStudent" => handle_list_by_student(state, req),
        "submittedNotebooks.add"
        | "submittedNotebooks.find"
        | "submittedNotebooks.updateOrCreate"
        | "submittedNotebooks.remove" => handle_submitted_notebook(state, req),
        "submittedNotebooks.findById" => handle_submitted_notebook_by_id(state, req),
        "submittedNotebooks.list" => handle_submitted_notebook_list(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
