use super::structure::ensure_structure_editable;
use super::{new_id, resolve_assignment_id, resolve_notebook_id, ColumnUpdates, Gradebook};
use crate::calc;
use crate::error::{GradebookError, Result};
use crate::models::{
    CellType, GradeCell, GradeCellFields, SolutionCell, SourceCell, SourceCellFields,
};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};

const CELL_SCOPE_JOIN: &str = "JOIN notebook n ON n.id = c.notebook_id
         JOIN assignment a ON a.id = n.assignment_id";

fn validate_max_score(name: &str, max_score: f64) -> Result<()> {
    if max_score.is_nan() || max_score < 0.0 {
        return Err(GradebookError::invalid(format!(
            "grade cell {name} has invalid max_score {max_score}"
        )));
    }
    Ok(())
}

// Grade cells

fn grade_cell_select_sql(where_clause: &str) -> String {
    format!(
        "SELECT c.id, c.name, c.max_score, c.cell_type, n.name, a.name
         FROM grade_cell c
         {CELL_SCOPE_JOIN}
         {where_clause}
         ORDER BY c.name"
    )
}

fn grade_cell_from_row(row: &Row<'_>) -> rusqlite::Result<GradeCell> {
    Ok(GradeCell {
        id: row.get(0)?,
        name: row.get(1)?,
        max_score: row.get(2)?,
        cell_type: CellType::from_column(3, row.get(3)?)?,
        notebook: row.get(4)?,
        assignment: row.get(5)?,
    })
}

fn load_grade_cell(conn: &Connection, name: &str, notebook: &str, assignment: &str) -> Result<GradeCell> {
    conn.query_row(
        &grade_cell_select_sql("WHERE c.name = ? AND n.name = ? AND a.name = ?"),
        [name, notebook, assignment],
        grade_cell_from_row,
    )
    .optional()?
    .ok_or_else(|| {
        GradebookError::missing(format!("No such grade cell: {assignment}/{notebook}/{name}"))
    })
}

// Solution cells

fn solution_cell_select_sql(where_clause: &str) -> String {
    format!(
        "SELECT c.id, c.name, n.name, a.name
         FROM solution_cell c
         {CELL_SCOPE_JOIN}
         {where_clause}
         ORDER BY c.name"
    )
}

fn solution_cell_from_row(row: &Row<'_>) -> rusqlite::Result<SolutionCell> {
    Ok(SolutionCell {
        id: row.get(0)?,
        name: row.get(1)?,
        notebook: row.get(2)?,
        assignment: row.get(3)?,
    })
}

fn load_solution_cell(
    conn: &Connection,
    name: &str,
    notebook: &str,
    assignment: &str,
) -> Result<SolutionCell> {
    conn.query_row(
        &solution_cell_select_sql("WHERE c.name = ? AND n.name = ? AND a.name = ?"),
        [name, notebook, assignment],
        solution_cell_from_row,
    )
    .optional()?
    .ok_or_else(|| {
        GradebookError::missing(format!("No such solution cell: {assignment}/{notebook}/{name}"))
    })
}

// Source cells

fn source_cell_select_sql(where_clause: &str) -> String {
    format!(
        "SELECT c.id, c.name, c.cell_type, c.locked, c.source, c.checksum, n.name, a.name
         FROM source_cell c
         {CELL_SCOPE_JOIN}
         {where_clause}
         ORDER BY c.name"
    )
}

fn source_cell_from_row(row: &Row<'_>) -> rusqlite::Result<SourceCell> {
    Ok(SourceCell {
        id: row.get(0)?,
        name: row.get(1)?,
        cell_type: CellType::from_column(2, row.get(2)?)?,
        locked: row.get(3)?,
        source: row.get(4)?,
        checksum: row.get(5)?,
        notebook: row.get(6)?,
        assignment: row.get(7)?,
    })
}

fn load_source_cell(
    conn: &Connection,
    name: &str,
    notebook: &str,
    assignment: &str,
) -> Result<SourceCell> {
    conn.query_row(
        &source_cell_select_sql("WHERE c.name = ? AND n.name = ? AND a.name = ?"),
        [name, notebook, assignment],
        source_cell_from_row,
    )
    .optional()?
    .ok_or_else(|| {
        GradebookError::missing(format!("No such source cell: {assignment}/{notebook}/{name}"))
    })
}

fn list_cells<T>(
    conn: &Connection,
    sql: &str,
    notebook: &str,
    assignment: &str,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    resolve_notebook_id(conn, notebook, assignment)?;
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([notebook, assignment], map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

impl Gradebook {
    pub fn grade_cells(&self, notebook: &str, assignment: &str) -> Result<Vec<GradeCell>> {
        list_cells(
            &self.conn,
            &grade_cell_select_sql("WHERE n.name = ? AND a.name = ?"),
            notebook,
            assignment,
            grade_cell_from_row,
        )
    }

    /// Adds a grade cell; `max_score` and `cell_type` are required. Blocked
    /// once the assignment has submissions.
    pub fn add_grade_cell(
        &self,
        name: &str,
        notebook: &str,
        assignment: &str,
        fields: &GradeCellFields,
    ) -> Result<GradeCell> {
        let Some(max_score) = fields.max_score else {
            return Err(GradebookError::invalid(format!("grade cell {name} requires max_score")));
        };
        let Some(cell_type) = fields.cell_type else {
            return Err(GradebookError::invalid(format!("grade cell {name} requires cell_type")));
        };
        validate_max_score(name, max_score)?;

        let tx = self.conn.unchecked_transaction()?;
        let assignment_id = resolve_assignment_id(&tx, assignment)?;
        let notebook_id = resolve_notebook_id(&tx, notebook, assignment)?;
        ensure_structure_editable(&tx, &assignment_id, assignment)?;
        tx.execute(
            "INSERT INTO grade_cell(id, name, max_score, cell_type, notebook_id)
             VALUES(?, ?, ?, ?, ?)",
            (new_id(), name, max_score, cell_type.as_str(), &notebook_id),
        )?;
        tx.commit()?;
        info!(assignment, notebook, cell = name, "added grade cell");
        load_grade_cell(&self.conn, name, notebook, assignment)
    }

    pub fn find_grade_cell(&self, name: &str, notebook: &str, assignment: &str) -> Result<GradeCell> {
        load_grade_cell(&self.conn, name, notebook, assignment)
    }

    pub fn update_or_create_grade_cell(
        &self,
        name: &str,
        notebook: &str,
        assignment: &str,
        fields: &GradeCellFields,
    ) -> Result<GradeCell> {
        match self.find_grade_cell(name, notebook, assignment) {
            Err(GradebookError::MissingEntry(_)) => {
                self.add_grade_cell(name, notebook, assignment, fields)
            }
            Err(e) => Err(e),
            Ok(existing) => {
                if let Some(max_score) = fields.max_score {
                    validate_max_score(name, max_score)?;
                }
                let mut updates = ColumnUpdates::default();
                updates.set_opt("max_score", fields.max_score);
                updates.set_opt("cell_type", fields.cell_type.map(|t| t.as_str().to_string()));
                if !updates.is_empty() {
                    let tx = self.conn.unchecked_transaction()?;
                    updates.apply(&tx, "grade_cell", &existing.id)?;
                    tx.commit()?;
                    debug!(assignment, notebook, cell = name, "updated grade cell");
                }
                self.find_grade_cell(name, notebook, assignment)
            }
        }
    }

    /// Deletes a grade cell and every grade given against it.
    pub fn remove_grade_cell(&self, name: &str, notebook: &str, assignment: &str) -> Result<()> {
        let cell = self.find_grade_cell(name, notebook, assignment)?;
        let tx = self.conn.unchecked_transaction()?;
        let grades = tx.execute("DELETE FROM grade WHERE cell_id = ?", [&cell.id])?;
        tx.execute("DELETE FROM grade_cell WHERE id = ?", [&cell.id])?;
        tx.commit()?;
        info!(assignment, notebook, cell = name, grades, "removed grade cell");
        Ok(())
    }

    pub fn solution_cells(&self, notebook: &str, assignment: &str) -> Result<Vec<SolutionCell>> {
        list_cells(
            &self.conn,
            &solution_cell_select_sql("WHERE n.name = ? AND a.name = ?"),
            notebook,
            assignment,
            solution_cell_from_row,
        )
    }

    /// Adds a solution cell. Blocked once the assignment has submissions.
    pub fn add_solution_cell(
        &self,
        name: &str,
        notebook: &str,
        assignment: &str,
    ) -> Result<SolutionCell> {
        if name.trim().is_empty() {
            return Err(GradebookError::invalid("solution cell name must not be empty"));
        }
        let tx = self.conn.unchecked_transaction()?;
        let assignment_id = resolve_assignment_id(&tx, assignment)?;
        let notebook_id = resolve_notebook_id(&tx, notebook, assignment)?;
        ensure_structure_editable(&tx, &assignment_id, assignment)?;
        tx.execute(
            "INSERT INTO solution_cell(id, name, notebook_id) VALUES(?, ?, ?)",
            (new_id(), name, &notebook_id),
        )?;
        tx.commit()?;
        info!(assignment, notebook, cell = name, "added solution cell");
        load_solution_cell(&self.conn, name, notebook, assignment)
    }

    pub fn find_solution_cell(
        &self,
        name: &str,
        notebook: &str,
        assignment: &str,
    ) -> Result<SolutionCell> {
        load_solution_cell(&self.conn, name, notebook, assignment)
    }

    /// Solution cells carry no editable fields, so an existing cell is
    /// returned unchanged.
    pub fn update_or_create_solution_cell(
        &self,
        name: &str,
        notebook: &str,
        assignment: &str,
    ) -> Result<SolutionCell> {
        match self.find_solution_cell(name, notebook, assignment) {
            Err(GradebookError::MissingEntry(_)) => self.add_solution_cell(name, notebook, assignment),
            other => other,
        }
    }

    /// Deletes a solution cell and every comment attached to it.
    pub fn remove_solution_cell(&self, name: &str, notebook: &str, assignment: &str) -> Result<()> {
        let cell = self.find_solution_cell(name, notebook, assignment)?;
        let tx = self.conn.unchecked_transaction()?;
        let comments = tx.execute("DELETE FROM comment WHERE cell_id = ?", [&cell.id])?;
        tx.execute("DELETE FROM solution_cell WHERE id = ?", [&cell.id])?;
        tx.commit()?;
        info!(assignment, notebook, cell = name, comments, "removed solution cell");
        Ok(())
    }

    pub fn source_cells(&self, notebook: &str, assignment: &str) -> Result<Vec<SourceCell>> {
        list_cells(
            &self.conn,
            &source_cell_select_sql("WHERE n.name = ? AND a.name = ?"),
            notebook,
            assignment,
            source_cell_from_row,
        )
    }

    /// Adds a source cell. Without an explicit checksum one is computed from
    /// the cell type and source.
    pub fn add_source_cell(
        &self,
        name: &str,
        notebook: &str,
        assignment: &str,
        fields: &SourceCellFields,
    ) -> Result<SourceCell> {
        if name.trim().is_empty() {
            return Err(GradebookError::invalid("source cell name must not be empty"));
        }
        let Some(cell_type) = fields.cell_type else {
            return Err(GradebookError::invalid(format!("source cell {name} requires cell_type")));
        };
        let source = fields.source.clone().flatten();
        let checksum = match &fields.checksum {
            Some(v) => v.clone(),
            None => Some(calc::compute_checksum(cell_type, source.as_deref())),
        };

        let tx = self.conn.unchecked_transaction()?;
        let notebook_id = resolve_notebook_id(&tx, notebook, assignment)?;
        tx.execute(
            "INSERT INTO source_cell(id, name, cell_type, locked, source, checksum, notebook_id)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                new_id(),
                name,
                cell_type.as_str(),
                fields.locked.unwrap_or(false),
                source,
                checksum,
                &notebook_id,
            ),
        )?;
        tx.commit()?;
        info!(assignment, notebook, cell = name, "added source cell");
        load_source_cell(&self.conn, name, notebook, assignment)
    }

    pub fn find_source_cell(&self, name: &str, notebook: &str, assignment: &str) -> Result<SourceCell> {
        load_source_cell(&self.conn, name, notebook, assignment)
    }

    pub fn update_or_create_source_cell(
        &self,
        name: &str,
        notebook: &str,
        assignment: &str,
        fields: &SourceCellFields,
    ) -> Result<SourceCell> {
        match self.find_source_cell(name, notebook, assignment) {
            Err(GradebookError::MissingEntry(_)) => {
                self.add_source_cell(name, notebook, assignment, fields)
            }
            Err(e) => Err(e),
            Ok(existing) => {
                let mut updates = ColumnUpdates::default();
                updates.set_opt("cell_type", fields.cell_type.map(|t| t.as_str().to_string()));
                updates.set_opt("locked", fields.locked);
                updates.set_opt("source", fields.source.clone());
                updates.set_opt("checksum", fields.checksum.clone());
                if !updates.is_empty() {
                    let tx = self.conn.unchecked_transaction()?;
                    updates.apply(&tx, "source_cell", &existing.id)?;
                    tx.commit()?;
                    debug!(assignment, notebook, cell = name, "updated source cell");
                }
                self.find_source_cell(name, notebook, assignment)
            }
        }
    }

    pub fn remove_source_cell(&self, name: &str, notebook: &str, assignment: &str) -> Result<()> {
        let cell = self.find_source_cell(name, notebook, assignment)?;
        self.conn
            .execute("DELETE FROM source_cell WHERE id = ?", [&cell.id])?;
        info!(assignment, notebook, cell = name, "removed source cell");
        Ok(())
    }
}
