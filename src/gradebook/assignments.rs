use super::{
    delete_notebook_rows, delete_submission_rows, new_id, query_ids, resolve_assignment_id,
    ColumnUpdates, Gradebook,
};
use crate::calc;
use crate::dates;
use crate::error::{GradebookError, Result};
use crate::models::{Assignment, AssignmentFields, CellType};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};

fn assignment_select_sql(where_clause: &str) -> String {
    format!(
        "SELECT a.id, a.name, a.duedate, {}, {}, {}, {}
         FROM assignment a
         {where_clause}
         ORDER BY a.duedate, a.name",
        calc::assignment_num_submissions_sql("a.id"),
        calc::assignment_max_score_sql("a.id", None),
        calc::assignment_max_score_sql("a.id", Some(CellType::Code)),
        calc::assignment_max_score_sql("a.id", Some(CellType::Markdown)),
    )
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    let duedate: Option<String> = row.get(2)?;
    Ok(Assignment {
        id: row.get(0)?,
        name: row.get(1)?,
        duedate: dates::from_column(duedate).map(|d| dates::format_utc(&d)),
        num_submissions: row.get(3)?,
        max_score: row.get(4)?,
        max_code_score: row.get(5)?,
        max_written_score: row.get(6)?,
    })
}

pub(crate) fn load_assignment(conn: &Connection, name: &str) -> Result<Assignment> {
    conn.query_row(&assignment_select_sql("WHERE a.name = ?"), [name], assignment_from_row)
        .optional()?
        .ok_or_else(|| GradebookError::missing(format!("No such assignment: {name}")))
}

impl Gradebook {
    /// All assignments, ordered by due date then name.
    pub fn assignments(&self) -> Result<Vec<Assignment>> {
        let mut stmt = self.conn.prepare(&assignment_select_sql(""))?;
        let rows = stmt
            .query_map([], assignment_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn add_assignment(&self, name: &str, fields: &AssignmentFields) -> Result<Assignment> {
        if name.trim().is_empty() {
            return Err(GradebookError::invalid("assignment name must not be empty"));
        }
        let duedate = fields.duedate.flatten().map(|d| dates::format_utc(&d));
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO assignment(id, name, duedate) VALUES(?, ?, ?)",
            (new_id(), name, duedate),
        )?;
        tx.commit()?;
        info!(assignment = name, "added assignment");
        load_assignment(&self.conn, name)
    }

    pub fn find_assignment(&self, name: &str) -> Result<Assignment> {
        load_assignment(&self.conn, name)
    }

    pub fn update_or_create_assignment(
        &self,
        name: &str,
        fields: &AssignmentFields,
    ) -> Result<Assignment> {
        match self.find_assignment(name) {
            Err(GradebookError::MissingEntry(_)) => self.add_assignment(name, fields),
            Err(e) => Err(e),
            Ok(existing) => {
                let mut updates = ColumnUpdates::default();
                updates.set_opt(
                    "duedate",
                    fields.duedate.map(|d| d.map(|d| dates::format_utc(&d))),
                );
                if !updates.is_empty() {
                    let tx = self.conn.unchecked_transaction()?;
                    updates.apply(&tx, "assignment", &existing.id)?;
                    tx.commit()?;
                    debug!(assignment = name, "updated assignment");
                }
                self.find_assignment(name)
            }
        }
    }

    /// Deletes an assignment: its submissions first, then its notebooks and
    /// their cells, then the assignment row.
    pub fn remove_assignment(&self, name: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let assignment_id = resolve_assignment_id(&tx, name)?;
        let submissions = query_ids(
            &tx,
            "SELECT id FROM submitted_assignment WHERE assignment_id = ?",
            &assignment_id,
        )?;
        for submission_id in &submissions {
            delete_submission_rows(&tx, submission_id)?;
        }
        let notebooks = query_ids(
            &tx,
            "SELECT id FROM notebook WHERE assignment_id = ?",
            &assignment_id,
        )?;
        for notebook_id in &notebooks {
            delete_notebook_rows(&tx, notebook_id)?;
        }
        tx.execute("DELETE FROM assignment WHERE id = ?", [&assignment_id])?;
        tx.commit()?;
        info!(
            assignment = name,
            submissions = submissions.len(),
            notebooks = notebooks.len(),
            "removed assignment"
        );
        Ok(())
    }
}
