use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{
    gradebook, nullable_f64, nullable_string, optional_bool, optional_str, required_str, to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{CommentFields, GradeFields};
use serde_json::{json, Value};

/// (notebook, assignment, student) naming a submitted notebook.
fn submitted_key(params: &Value) -> Result<(&str, &str, &str), HandlerErr> {
    Ok((
        required_str(params, "notebook")?,
        required_str(params, "assignment")?,
        required_str(params, "studentId")?,
    ))
}

fn handle_find_grade(state: &AppState, req: &Request) -> HandlerResult {
    let cell = required_str(&req.params, "cell")?;
    let (notebook, assignment, student) = submitted_key(&req.params)?;
    to_json(&gradebook(state)?.find_grade(cell, notebook, assignment, student)?)
}

fn handle_find_grade_by_id(state: &AppState, req: &Request) -> HandlerResult {
    let id = required_str(&req.params, "id")?;
    to_json(&gradebook(state)?.find_grade_by_id(id)?)
}

fn handle_list_grades(state: &AppState, req: &Request) -> HandlerResult {
    let (notebook, assignment, student) = submitted_key(&req.params)?;
    let grades = gradebook(state)?.grades(notebook, assignment, student)?;
    Ok(json!({ "grades": to_json(&grades)? }))
}

/// `mode: "review"` (the default) recomputes needs_manual_grade the way a
/// grader's edit does; `mode: "raw"` writes only the supplied fields.
fn handle_update_grade(state: &AppState, req: &Request) -> HandlerResult {
    let id = required_str(&req.params, "id")?;
    let fields = GradeFields {
        auto_score: nullable_f64(&req.params, "autoScore")?,
        manual_score: nullable_f64(&req.params, "manualScore")?,
        extra_credit: nullable_f64(&req.params, "extraCredit")?,
        needs_manual_grade: optional_bool(&req.params, "needsManualGrade")?,
    };
    let gb = gradebook(state)?;
    let grade = match optional_str(&req.params, "mode").unwrap_or("review") {
        "review" => gb.review_grade(id, &fields)?,
        "raw" => gb.update_grade(id, &fields)?,
        other => {
            return Err(HandlerErr::bad_params("mode must be \"review\" or \"raw\"")
                .with_details(json!({ "mode": other })))
        }
    };
    to_json(&grade)
}

fn handle_find_comment(state: &AppState, req: &Request) -> HandlerResult {
    let cell = required_str(&req.params, "cell")?;
    let (notebook, assignment, student) = submitted_key(&req.params)?;
    to_json(&gradebook(state)?.find_comment(cell, notebook, assignment, student)?)
}

fn handle_find_comment_by_id(state: &AppState, req: &Request) -> HandlerResult {
    let id = required_str(&req.params, "id")?;
    to_json(&gradebook(state)?.find_comment_by_id(id)?)
}

fn handle_list_comments(state: &AppState, req: &Request) -> HandlerResult {
    let (notebook, assignment, student) = submitted_key(&req.params)?;
    let comments = gradebook(state)?.comments(notebook, assignment, student)?;
    Ok(json!({ "comments": to_json(&comments)? }))
}

fn handle_update_comment(state: &AppState, req: &Request) -> HandlerResult {
    let id = required_str(&req.params, "id")?;
    let fields = CommentFields {
        auto_comment: nullable_string(&req.params, "autoComment")?,
        manual_comment: nullable_string(&req.params, "manualComment")?,
    };
    to_json(&gradebook(state)?.update_comment(id, &fields)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "grades.find" => handle_find_grade(state, req),
        "grades.findById" => handle_find_grade_by_id(state, req),
        "grades.list" => handle_list_grades(state, req),
        "grades.update" => handle_update_grade(state, req),
        "comments.find" => handle_find_comment(state, req),
        "comments.findById" => handle_find_comment_by_id(state, req),
        "comments.list" => handle_list_comments(state, req),
        "comments.update" => handle_update_comment(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
