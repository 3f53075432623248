use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{gradebook, nullable_string, required_str, to_json};
use crate::ipc::types::{AppState, Request};
use crate::models::StudentFields;
use serde_json::{json, Value};

pub(crate) fn student_fields(params: &Value) -> Result<StudentFields, HandlerErr> {
    Ok(StudentFields {
        first_name: nullable_string(params, "firstName")?,
        last_name: nullable_string(params, "lastName")?,
        email: nullable_string(params, "email")?,
    })
}

fn handle_list(state: &AppState) -> HandlerResult {
    let students = gradebook(state)?.students()?;
    Ok(json!({ "students": to_json(&students)? }))
}

fn handle_find(state: &AppState, req: &Request) -> HandlerResult {
    let id = required_str(&req.params, "studentId")?;
    to_json(&gradebook(state)?.find_student(id)?)
}

fn handle_add(state: &AppState, req: &Request) -> HandlerResult {
    let id = required_str(&req.params, "studentId")?;
    let fields = student_fields(&req.params)?;
    to_json(&gradebook(state)?.add_student(id, &fields)?)
}

fn handle_update_or_create(state: &AppState, req: &Request) -> HandlerResult {
    let id = required_str(&req.params, "studentId")?;
    let fields = student_fields(&req.params)?;
    to_json(&gradebook(state)?.update_or_create_student(id, &fields)?)
}

fn handle_remove(state: &AppState, req: &Request) -> HandlerResult {
    let id = required_str(&req.params, "studentId")?;
    gradebook(state)?.remove_student(id)?;
    Ok(json!({ "removed": id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "students.list" => handle_list(state),
        "students.find" => handle_find(state, req),
        "students.add" => handle_add(state, req),
        "students.updateOrCreate" => handle_update_or_create(state, req),
        "students.remove" => handle_remove(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
