use crate::ipc::error::{respond, HandlerErr, HandlerResult};
use crate::ipc::helpers::{
    gradebook, nullable_string, optional_bool, optional_cell_type, optional_f64, required_str,
    to_json,
};
use crate::ipc::types::{AppState, Request};
use crate::models::{GradeCellFields, SourceCellFields};
use serde_json::{json, Value};

/// (cell, notebook, assignment) naming a cell.
fn cell_key(params: &Value) -> Result<(&str, &str, &str), HandlerErr> {
    Ok((
        required_str(params, "cell")?,
        required_str(params, "notebook")?,
        required_str(params, "assignment")?,
    ))
}

fn handle_grade_cells(state: &AppState, req: &Request) -> HandlerResult {
    let notebook = required_str(&req.params, "notebook")?;
    let assignment = required_str(&req.params, "assignment")?;
    let cells = gradebook(state)?.grade_cells(notebook, assignment)?;
    Ok(json!({ "gradeCells": to_json(&cells)? }))
}

fn handle_grade_cell(state: &AppState, req: &Request) -> HandlerResult {
    let (name, notebook, assignment) = cell_key(&req.params)?;
    let gb = gradebook(state)?;
    let fields = || -> Result<GradeCellFields, HandlerErr> {
        Ok(GradeCellFields {
            max_score: optional_f64(&req.params, "maxScore")?,
            cell_type: optional_cell_type(&req.params, "cellType")?,
        })
    };
    match req.method.as_str() {
        "gradeCells.find" => to_json(&gb.find_grade_cell(name, notebook, assignment)?),
        "gradeCells.add" => to_json(&gb.add_grade_cell(name, notebook, assignment, &fields()?)?),
        "gradeCells.updateOrCreate" => to_json(
            &gb.update_or_create_grade_cell(name, notebook, assignment, &fields()?)?,
        ),
        _ => {
            gb.remove_grade_cell(name, notebook, assignment)?;
            Ok(json!({ "removed": name }))
        }
    }
}

fn handle_solution_cells(state: &AppState, req: &Request) -> HandlerResult {
    let notebook = required_str(&req.params, "notebook")?;
    let assignment = required_str(&req.params, "assignment")?;
    let cells = gradebook(state)?.solution_cells(notebook, assignment)?;
    Ok(json!({ "solutionCells": to_json(&cells)? }))
}

fn handle_solution_cell(state: &AppState, req: &Request) -> HandlerResult {
    let (name, notebook, assignment) = cell_key(&req.params)?;
    let gb = gradebook(state)?;
    match req.method.as_str() {
        "solutionCells.find" => to_json(&gb.find_solution_cell(name, notebook, assignment)?),
        "solutionCells.add" => to_json(&gb.add_solution_cell(name, notebook, assignment)?),
        "solutionCells.updateOrCreate" => {
            to_json(&gb.update_or_create_solution_cell(name, notebook, assignment)?)
        }
        _ => {
            gb.remove_solution_cell(name, notebook, assignment)?;
            Ok(json!({ "removed": name }))
        }
    }
}

fn handle_source_cells(state: &AppState, req: &Request) -> HandlerResult {
    let notebook = required_str(&req.params, "notebook")?;
    let assignment = required_str(&req.params, "assignment")?;
    let cells = gradebook(state)?.source_cells(notebook, assignment)?;
    Ok(json!({ "sourceCells": to_json(&cells)? }))
}

fn handle_source_cell(state: &AppState, req: &Request) -> HandlerResult {
    let (name, notebook, assignment) = cell_key(&req.params)?;
    let gb = gradebook(state)?;
    let fields = || -> Result<SourceCellFields, HandlerErr> {
        Ok(SourceCellFields {
            cell_type: optional_cell_type(&req.params, "cellType")?,
            locked: optional_bool(&req.params, "locked")?,
            source: nullable_string(&req.params, "source")?,
            checksum: nullable_string(&req.params, "checksum")?,
        })
    };
    match req.method.as_str() {
        "sourceCells.find" => to_json(&gb.find_source_cell(name, notebook, assignment)?),
        "sourceCells.add" => to_json(&gb.add_source_cell(name, notebook, assignment, &fields()?)?),
        "sourceCells.updateOrCreate" => to_json(
            &gb.update_or_create_source_cell(name, notebook, assignment, &fields()?)?,
        ),
        _ => {
            gb.remove_source_cell(name, notebook, assignment)?;
            Ok(json!({ "removed": name }))
        }
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    let result = match req.method.as_str() {
        "gradeCells.list" => handle_grade_cells(state, req),
        "gradeCells.find" | "gradeCells.add" | "gradeCells.updateOrCreate"
        | "gradeCells.remove" => handle_grade_cell(state, req),
        "solutionCells.list" => handle_solution_cells(state, req),
        "solutionCells.find"
        | "solutionCells.add"
        | "solutionCells.updateOrCreate"
        | "solutionCells.remove" => handle_solution_cell(state, req),
        "sourceCells.list" => handle_source_cells(state, req),
        "sourceCells.find" | "sourceCells.add" | "sourceCells.updateOrCreate"
        | "sourceCells.remove" => handle_source_cell(state, req),
        _ => return None,
    };
    Some(respond(&req.id, result))
}
