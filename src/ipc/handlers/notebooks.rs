use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{gradebook, nullable_string, required_str, string_list, to_json};
use crate::ipc::types::{AppState, Request};
use crate::models::{CellType, GradeCellSpec, NotebookFields};
use serde_json::{json, Value};

fn grade_cell_specs(params: &Value) -> Result<Vec<GradeCellSpec>, HandlerErr> {
    let Some(items) = params.get("gradeCells").and_then(|v| v.as_array()) else {
        return Err(HandlerErr::bad_params("missing params.gradeCells"));
    };
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let name = item.get("name").and_then(|v| v.as_str());
            let max_score = item.get("maxScore").and_then(|v| v.as_f64());
            let cell_type = item
                .get("cellType")
                .and_then(|v| v.as_str())
                .and_then(CellType::parse);
            match (name, max_score, cell_type) {
                (Some(name), Some(max_score), Some(cell_type)) => Ok(GradeCellSpec {
                    name: name.to_string(),
                    max_score,
                    cell_type,
                }),
                _ => Err(HandlerErr::bad_params(
                    "each grade cell needs name, maxScore and cellType",
                )
                .with_details(json!({ "index": i }))),
            }
        })
        .collect()
}

fn handle_list(state: &AppState, req: &Request) -> HandlerResult {
    let assignment = required_str(&req.params, "assignment")?;
    let notebooks = gradebook(state)?.notebooks(assignment)?;
    Ok(json!({ "notebooks": to_json(&notebooks)? }))
}

fn handle_find(state: &AppState, req: &Request) -> HandlerResult {
    let name = required_str(&req.params, "notebook")?;
    let assignment = required_str(&req.params, "assignment")?;
    to_json(&gradebook(state)?.find_notebook(name, assignment)?)
}

fn handle_add(state: &AppState, req: &Request, upsert: bool) -> HandlerResult {
    let name = required_str(&req.params, "notebook")?;
    let assignment = required_str(&req.params, "assignment")?;
    let fields = NotebookFields {
        kernelspec: nullable_string(&req.params, "kernelspec")?,
    };
    let gb = gradebook(state)?;
    let notebook = if upsert {
        gb.update_or_create_notebook(name, assignment, &fields)?
    } else {
        gb.add_notebook(name, assignment, &fields)?
    };
    to_json(&notebook)
}

fn handle_remove(state: &AppState, req: &Request) -> HandlerResult {
    let name = required_str(&req.params, "notebook")?;
    let assignment = required_str(&req.params, "assignment")?;
    gradebook(state)?.remove_notebook(name, assignment)?;
    Ok(json!({ "removed": name }))
}

fn handle_sync_cells(state: &AppState, req: &Request) -> HandlerResult {
    let name = required_str(&req.params, "notebook")?;
    let assignment = required_str(&req.params, "assignment")?;
    let grade_cells = grade_cell_specs(&req.params)?;
    let solution_cells = string_list(&req.params, "solutionCells")?;
    to_json(&gradebook(state)?.sync_notebook_cells(name, assignment, &grade_cells, &solution_cells)?)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "notebooks.list" => handle_list(state, req),
        "notebooks.find" => handle_find(state, req),
        "notebooks.add" => handle_add(state, req, false),
        "notebooks.updateOrCreate" => handle_add(state, req, true),
        "notebooks.remove" => handle_remove(state, req),
        "notebooks.syncCells" => handle_sync_cells(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
