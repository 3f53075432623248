//! The gradebook facade.
//!
//! Every mutation runs inside one transaction; a failed step drops the
//! transaction, which rolls back everything written so far. Lookups are by
//! natural key (names within the parent scope, student ids).

mod assignments;
mod cells;
mod grades;
mod notebooks;
mod stats;
mod structure;
mod students;
mod submissions;


use crate::db;
use crate::error::{GradebookError, Result};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

pub struct Gradebook {
    conn: Connection,
}

impl Gradebook {
    pub fn open(workspace: &Path) -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_db(workspace)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> anyhow::Result<Self> {
        Ok(Self {
            conn: db::open_in_memory()?,
        })
    }

    #[cfg(test)]
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

pub(crate) fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

pub(crate) fn resolve_assignment_id(conn: &Connection, assignment: &str) -> Result<String> {
    conn.query_row(
        "SELECT id FROM assignment WHERE name = ?",
        [assignment],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| GradebookError::missing(format!("No such assignment: {assignment}")))
}

pub(crate) fn resolve_notebook_id(
    conn: &Connection,
    notebook: &str,
    assignment: &str,
) -> Result<String> {
    conn.query_row(
        "SELECT n.id
         FROM notebook n
         JOIN assignment a ON a.id = n.assignment_id
         WHERE n.name = ? AND a.name = ?",
        [notebook, assignment],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| GradebookError::missing(format!("No such notebook: {assignment}/{notebook}")))
}

pub(crate) fn ensure_student_exists(conn: &Connection, student: &str) -> Result<()> {
    let exists: Option<i64> = conn
        .query_row("SELECT 1 FROM student WHERE id = ?", [student], |r| r.get(0))
        .optional()?;
    match exists {
        Some(_) => Ok(()),
        None => Err(GradebookError::missing(format!("No such student: {student}"))),
    }
}

pub(crate) fn resolve_submission_id(
    conn: &Connection,
    assignment: &str,
    student: &str,
) -> Result<String> {
    conn.query_row(
        "SELECT sa.id
         FROM submitted_assignment sa
         JOIN assignment a ON a.id = sa.assignment_id
         WHERE a.name = ? AND sa.student_id = ?",
        [assignment, student],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| {
        GradebookError::missing(format!("No such submission: {assignment} for {student}"))
    })
}

pub(crate) fn resolve_submission_notebook_id(
    conn: &Connection,
    notebook: &str,
    assignment: &str,
    student: &str,
) -> Result<String> {
    conn.query_row(
        "SELECT sn.id
         FROM submitted_notebook sn
         JOIN notebook n ON n.id = sn.notebook_id
         JOIN submitted_assignment sa ON sa.id = sn.assignment_id
         JOIN assignment a ON a.id = sa.assignment_id
         WHERE n.name = ? AND a.name = ? AND sa.student_id = ?",
        [notebook, assignment, student],
        |r| r.get(0),
    )
    .optional()?
    .ok_or_else(|| {
        GradebookError::missing(format!(
            "No such submitted notebook: {assignment}/{notebook} for {student}"
        ))
    })
}

pub(crate) fn assignment_has_submissions(conn: &Connection, assignment_id: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM submitted_assignment WHERE assignment_id = ?",
        [assignment_id],
        |r| r.get(0),
    )?;
    Ok(n > 0)
}

/// Column assignments for a partial UPDATE. Only supplied fields are written.
#[derive(Default)]
pub(crate) struct ColumnUpdates {
    columns: Vec<&'static str>,
    values: Vec<Value>,
}

impl ColumnUpdates {
    pub(crate) fn set(&mut self, column: &'static str, value: impl Into<Value>) {
        self.columns.push(column);
        self.values.push(value.into());
    }

    pub(crate) fn set_opt<T: Into<Value>>(&mut self, column: &'static str, field: Option<T>) {
        if let Some(v) = field {
            self.set(column, v);
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub(crate) fn apply(self, conn: &Connection, table: &str, id: &str) -> Result<()> {
        if self.is_empty() {
            return Ok(());
        }
        let set_clause = self
            .columns
            .iter()
            .map(|c| format!("{c} = ?"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!("UPDATE {table} SET {set_clause} WHERE id = ?");
        let mut values = self.values;
        values.push(Value::Text(id.to_string()));
        conn.execute(&sql, params_from_iter(values))?;
        Ok(())
    }
}

// Cascading deletes, child before parent. Callers own the transaction.

pub(crate) fn delete_submission_notebook_rows(conn: &Connection, submitted_notebook_id: &str) -> Result<()> {
    conn.execute("DELETE FROM grade WHERE notebook_id = ?", [submitted_notebook_id])?;
    conn.execute("DELETE FROM comment WHERE notebook_id = ?", [submitted_notebook_id])?;
    conn.execute("DELETE FROM submitted_notebook WHERE id = ?", [submitted_notebook_id])?;
    Ok(())
}

pub(crate) fn delete_submission_rows(conn: &Connection, submission_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM grade WHERE notebook_id IN (
           SELECT id FROM submitted_notebook WHERE assignment_id = ?
         )",
        [submission_id],
    )?;
    conn.execute(
        "DELETE FROM comment WHERE notebook_id IN (
           SELECT id FROM submitted_notebook WHERE assignment_id = ?
         )",
        [submission_id],
    )?;
    conn.execute(
        "DELETE FROM submitted_notebook WHERE assignment_id = ?",
        [submission_id],
    )?;
    conn.execute("DELETE FROM submitted_assignment WHERE id = ?", [submission_id])?;
    Ok(())
}

pub(crate) fn delete_notebook_rows(conn: &Connection, notebook_id: &str) -> Result<()> {
    conn.execute(
        "DELETE FROM grade WHERE notebook_id IN (
           SELECT id FROM submitted_notebook WHERE notebook_id = ?
         )",
        [notebook_id],
    )?;
    conn.execute(
        "DELETE FROM comment WHERE notebook_id IN (
           SELECT id FROM submitted_notebook WHERE notebook_id = ?
         )",
        [notebook_id],
    )?;
    conn.execute(
        "DELETE FROM submitted_notebook WHERE notebook_id = ?",
        [notebook_id],
    )?;
    conn.execute("DELETE FROM grade_cell WHERE notebook_id = ?", [notebook_id])?;
    conn.execute("DELETE FROM solution_cell WHERE notebook_id = ?", [notebook_id])?;
    conn.execute("DELETE FROM source_cell WHERE notebook_id = ?", [notebook_id])?;
    conn.execute("DELETE FROM notebook WHERE id = ?", [notebook_id])?;
    Ok(())
}

/// Collects the ids returned by a single-column query.
pub(crate) fn query_ids(conn: &Connection, sql: &str, key: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt
        .query_map([key], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(ids)
}
