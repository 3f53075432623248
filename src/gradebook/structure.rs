use super::{
    assignment_has_submissions, delete_notebook_rows, new_id, query_ids, resolve_assignment_id,
    resolve_notebook_id, Gradebook,
};
use super::notebooks::{insert_notebook, load_notebook};
use crate::error::{GradebookError, Result};
use crate::models::{GradeCellSpec, Notebook, NotebookFields};
use rusqlite::Connection;
use std::collections::BTreeSet;
use tracing::{info, warn};

/// Rejects changes to the notebook or cell set of an assignment that already
/// has submissions.
pub(crate) fn ensure_structure_editable(
    conn: &Connection,
    assignment_id: &str,
    assignment: &str,
) -> Result<()> {
    if assignment_has_submissions(conn, assignment_id)? {
        warn!(assignment, "structural edit rejected: assignment has submissions");
        return Err(GradebookError::invalid(format!(
            "cannot change the structure of assignment {assignment}: it already has submissions"
        )));
    }
    Ok(())
}

fn unique_names<'a, I>(names: I, what: &str) -> Result<BTreeSet<String>>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = BTreeSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(GradebookError::invalid(format!("{what} name must not be empty")));
        }
        if !out.insert(name.to_string()) {
            return Err(GradebookError::invalid(format!("duplicate {what} name: {name}")));
        }
    }
    Ok(out)
}

fn current_names(conn: &Connection, sql: &str, key: &str) -> Result<BTreeSet<String>> {
    Ok(query_ids(conn, sql, key)?.into_iter().collect())
}

impl Gradebook {
    /// Makes the assignment's notebook set equal to `names`. With submissions
    /// present only an identical set is accepted, and nothing changes.
    pub fn sync_assignment_notebooks(
        &self,
        assignment: &str,
        names: &[String],
    ) -> Result<Vec<Notebook>> {
        let desired = unique_names(names.iter().map(String::as_str), "notebook")?;
        let tx = self.conn.unchecked_transaction()?;
        let assignment_id = resolve_assignment_id(&tx, assignment)?;
        let current = current_names(
            &tx,
            "SELECT name FROM notebook WHERE assignment_id = ?",
            &assignment_id,
        )?;

        if current != desired {
            ensure_structure_editable(&tx, &assignment_id, assignment)?;
            for name in desired.difference(&current) {
                insert_notebook(&tx, &assignment_id, name, &NotebookFields::default())?;
            }
            for name in current.difference(&desired) {
                let notebook_id = resolve_notebook_id(&tx, name, assignment)?;
                delete_notebook_rows(&tx, &notebook_id)?;
            }
            info!(
                assignment,
                added = desired.difference(&current).count(),
                removed = current.difference(&desired).count(),
                "synced notebooks"
            );
        }
        tx.commit()?;
        self.notebooks(assignment)
    }

    /// Makes a notebook's grade and solution cells equal to the given sets.
    /// Existing grade cells take the new max score and type. With submissions
    /// present the cell names must not change.
    pub fn sync_notebook_cells(
        &self,
        notebook: &str,
        assignment: &str,
        grade_cells: &[GradeCellSpec],
        solution_cells: &[String],
    ) -> Result<Notebook> {
        let desired_grade = unique_names(grade_cells.iter().map(|c| c.name.as_str()), "grade cell")?;
        let desired_solution =
            unique_names(solution_cells.iter().map(String::as_str), "solution cell")?;
        for cell in grade_cells {
            if !(cell.max_score >= 0.0) {
                return Err(GradebookError::invalid(format!(
                    "grade cell {} has invalid max_score {}",
                    cell.name, cell.max_score
                )));
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        let assignment_id = resolve_assignment_id(&tx, assignment)?;
        let notebook_id = resolve_notebook_id(&tx, notebook, assignment)?;
        let current_grade = current_names(
            &tx,
            "SELECT name FROM grade_cell WHERE notebook_id = ?",
            &notebook_id,
        )?;
        let current_solution = current_names(
            &tx,
            "SELECT name FROM solution_cell WHERE notebook_id = ?",
            &notebook_id,
        )?;

        if current_grade != desired_grade || current_solution != desired_solution {
            ensure_structure_editable(&tx, &assignment_id, assignment)?;
            for name in current_grade.difference(&desired_grade) {
                tx.execute(
                    "DELETE FROM grade_cell WHERE notebook_id = ? AND name = ?",
                    [&notebook_id, name],
                )?;
            }
            for name in current_solution.difference(&desired_solution) {
                tx.execute(
                    "DELETE FROM solution_cell WHERE notebook_id = ? AND name = ?",
                    [&notebook_id, name],
                )?;
            }
            for name in desired_solution.difference(&current_solution) {
                tx.execute(
                    "INSERT INTO solution_cell(id, name, notebook_id) VALUES(?, ?, ?)",
                    (new_id(), name, &notebook_id),
                )?;
            }
        }

        for cell in grade_cells {
            tx.execute(
                "INSERT INTO grade_cell(id, name, max_score, cell_type, notebook_id)
                 VALUES(?, ?, ?, ?, ?)
                 ON CONFLICT(name, notebook_id) DO UPDATE SET
                   max_score = excluded.max_score,
                   cell_type = excluded.cell_type",
                (
                    new_id(),
                    &cell.name,
                    cell.max_score,
                    cell.cell_type.as_str(),
                    &notebook_id,
                ),
            )?;
        }
        tx.commit()?;
        info!(
            assignment,
            notebook,
            grade_cells = grade_cells.len(),
            solution_cells = solution_cells.len(),
            "synced notebook cells"
        );
        load_notebook(&self.conn, notebook, assignment)
    }
}
