use crate::ipc::error::{respond, HandlerResult};
use crate::ipc::helpers::{gradebook, nullable_datetime, required_str, string_list, to_json};
use crate::ipc::types::{AppState, Request};
use crate::models::AssignmentFields;
use serde_json::json;

fn handle_list(state: &AppState) -> HandlerResult {
    let assignments = gradebook(state)?.assignments()?;
    Ok(json!({ "assignments": to_json(&assignments)? }))
}

fn handle_find(state: &AppState, req: &Request) -> HandlerResult {
    let name = required_str(&req.params, "assignment")?;
    to_json(&gradebook(state)?.find_assignment(name)?)
}

fn handle_add(state: &AppState, req: &Request, upsert: bool) -> HandlerResult {
    let name = required_str(&req.params, "assignment")?;
    let fields = AssignmentFields {
        duedate: nullable_datetime(&req.params, "duedate")?,
    };
    let gb = gradebook(state)?;
    let assignment = if upsert {
        gb.update_or_create_assignment(name, &fields)?
    } else {
        gb.add_assignment(name, &fields)?
    };
    to_json(&assignment)
}

fn handle_remove(state: &AppState, req: &Request) -> HandlerResult {
    let name = required_str(&req.params, "assignment")?;
    gradebook(state)?.remove_assignment(name)?;
    Ok(json!({ "removed": name }))
}

fn handle_sync_notebooks(state: &AppState, req: &Request) -> HandlerResult {
    let name = required_str(&req.params, "assignment")?;
    let notebooks = string_list(&req.params, "notebooks")?;
    let synced = gradebook(state)?.sync_assignment_notebooks(name, &notebooks)?;
    Ok(json!({ "notebooks": to_json(&synced)? }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "assignments.list" => handle_list(state),
        "assignments.find" => handle_find(state, req),
        "assignments.add" => handle_add(state, req, false),
        "assignments.updateOrCreate" => handle_add(state, req, true),
        "assignments.remove" => handle_remove(state, req),
        "assignments.syncNotebooks" => handle_sync_notebooks(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
