use super::{
    delete_notebook_rows, new_id, query_ids, resolve_assignment_id, resolve_notebook_id,
    ColumnUpdates, Gradebook,
};
use super::structure::ensure_structure_editable;
use crate::calc;
use crate::error::{GradebookError, Result};
use crate::models::{CellType, Notebook, NotebookFields};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};

fn notebook_select_sql(where_clause: &str) -> String {
    format!(
        "SELECT n.id, n.name, a.name, n.kernelspec, {}, {}, {}, {}, {}
         FROM notebook n
         JOIN assignment a ON a.id = n.assignment_id
         {where_clause}
         ORDER BY n.name",
        calc::notebook_num_submissions_sql("n.id"),
        calc::notebook_max_score_sql("n.id", None),
        calc::notebook_max_score_sql("n.id", Some(CellType::Code)),
        calc::notebook_max_score_sql("n.id", Some(CellType::Markdown)),
        calc::notebook_needs_manual_grade_sql("n.id"),
    )
}

fn notebook_from_row(row: &Row<'_>) -> rusqlite::Result<Notebook> {
    Ok(Notebook {
        id: row.get(0)?,
        name: row.get(1)?,
        assignment: row.get(2)?,
        kernelspec: row.get(3)?,
        num_submissions: row.get(4)?,
        max_score: row.get(5)?,
        max_code_score: row.get(6)?,
        max_written_score: row.get(7)?,
        needs_manual_grade: row.get(8)?,
    })
}

pub(crate) fn load_notebook(conn: &Connection, name: &str, assignment: &str) -> Result<Notebook> {
    conn.query_row(
        &notebook_select_sql("WHERE n.name = ? AND a.name = ?"),
        [name, assignment],
        notebook_from_row,
    )
    .optional()?
    .ok_or_else(|| GradebookError::missing(format!("No such notebook: {assignment}/{name}")))
}

/// Inserts a notebook row without any structure guard.
pub(crate) fn insert_notebook(
    conn: &Connection,
    assignment_id: &str,
    name: &str,
    fields: &NotebookFields,
) -> Result<String> {
    if name.trim().is_empty() {
        return Err(GradebookError::invalid("notebook name must not be empty"));
    }
    let id = new_id();
    conn.execute(
        "INSERT INTO notebook(id, name, assignment_id, kernelspec) VALUES(?, ?, ?, ?)",
        (&id, name, assignment_id, fields.kernelspec.clone().flatten()),
    )?;
    Ok(id)
}

impl Gradebook {
    /// Notebooks of one assignment, ordered by name.
    pub fn notebooks(&self, assignment: &str) -> Result<Vec<Notebook>> {
        resolve_assignment_id(&self.conn, assignment)?;
        let mut stmt = self.conn.prepare(&notebook_select_sql("WHERE a.name = ?"))?;
        let rows = stmt
            .query_map([assignment], notebook_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Adds a notebook. Fails once the assignment has submissions, since the
    /// new notebook would be missing from every submitted copy.
    pub fn add_notebook(
        &self,
        name: &str,
        assignment: &str,
        fields: &NotebookFields,
    ) -> Result<Notebook> {
        let tx = self.conn.unchecked_transaction()?;
        let assignment_id = resolve_assignment_id(&tx, assignment)?;
        ensure_structure_editable(&tx, &assignment_id, assignment)?;
        insert_notebook(&tx, &assignment_id, name, fields)?;
        tx.commit()?;
        info!(assignment, notebook = name, "added notebook");
        load_notebook(&self.conn, name, assignment)
    }

    pub fn find_notebook(&self, name: &str, assignment: &str) -> Result<Notebook> {
        load_notebook(&self.conn, name, assignment)
    }

    pub fn update_or_create_notebook(
        &self,
        name: &str,
        assignment: &str,
        fields: &NotebookFields,
    ) -> Result<Notebook> {
        match self.find_notebook(name, assignment) {
            Err(GradebookError::MissingEntry(_)) => self.add_notebook(name, assignment, fields),
            Err(e) => Err(e),
            Ok(existing) => {
                let mut updates = ColumnUpdates::default();
                updates.set_opt("kernelspec", fields.kernelspec.clone());
                if !updates.is_empty() {
                    let tx = self.conn.unchecked_transaction()?;
                    updates.apply(&tx, "notebook", &existing.id)?;
                    tx.commit()?;
                    debug!(assignment, notebook = name, "updated notebook");
                }
                self.find_notebook(name, assignment)
            }
        }
    }

    /// Deletes a notebook with every submitted copy of it (grades and
    /// comments included) and all of its cell definitions.
    pub fn remove_notebook(&self, name: &str, assignment: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let notebook_id = resolve_notebook_id(&tx, name, assignment)?;
        let submitted = query_ids(
            &tx,
            "SELECT id FROM submitted_notebook WHERE notebook_id = ?",
            &notebook_id,
        )?;
        delete_notebook_rows(&tx, &notebook_id)?;
        tx.commit()?;
        info!(
            assignment,
            notebook = name,
            submissions = submitted.len(),
            "removed notebook"
        );
        Ok(())
    }
}
