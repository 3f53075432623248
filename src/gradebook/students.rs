use super::{delete_submission_rows, ensure_student_exists, query_ids, ColumnUpdates, Gradebook};
use crate::calc;
use crate::error::{GradebookError, Result};
use crate::models::{Student, StudentFields};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};

fn student_select_sql(where_clause: &str) -> String {
    format!(
        "SELECT s.id, s.first_name, s.last_name, s.email, {}, {}
         FROM student s
         {where_clause}
         ORDER BY s.last_name, s.first_name, s.id",
        calc::student_score_sql("s.id"),
        calc::ALL_ASSIGNMENTS_MAX_SCORE_SQL,
    )
}

pub(crate) fn student_from_row(row: &Row<'_>) -> rusqlite::Result<Student> {
    Ok(Student {
        id: row.get(0)?,
        first_name: row.get(1)?,
        last_name: row.get(2)?,
        email: row.get(3)?,
        score: row.get(4)?,
        max_score: row.get(5)?,
    })
}

fn load_student(conn: &Connection, student_id: &str) -> Result<Student> {
    conn.query_row(&student_select_sql("WHERE s.id = ?"), [student_id], student_from_row)
        .optional()?
        .ok_or_else(|| GradebookError::missing(format!("No such student: {student_id}")))
}

impl Gradebook {
    /// All students, ordered by last then first name.
    pub fn students(&self) -> Result<Vec<Student>> {
        let mut stmt = self.conn.prepare(&student_select_sql(""))?;
        let rows = stmt
            .query_map([], student_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn add_student(&self, student_id: &str, fields: &StudentFields) -> Result<Student> {
        if student_id.trim().is_empty() {
            return Err(GradebookError::invalid("student id must not be empty"));
        }
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO student(id, first_name, last_name, email) VALUES(?, ?, ?, ?)",
            (
                student_id,
                fields.first_name.clone().flatten(),
                fields.last_name.clone().flatten(),
                fields.email.clone().flatten(),
            ),
        )?;
        tx.commit()?;
        info!(student = student_id, "added student");
        load_student(&self.conn, student_id)
    }

    pub fn find_student(&self, student_id: &str) -> Result<Student> {
        load_student(&self.conn, student_id)
    }

    pub fn update_or_create_student(
        &self,
        student_id: &str,
        fields: &StudentFields,
    ) -> Result<Student> {
        match self.find_student(student_id) {
            Err(GradebookError::MissingEntry(_)) => self.add_student(student_id, fields),
            Err(e) => Err(e),
            Ok(_) => {
                let mut updates = ColumnUpdates::default();
                updates.set_opt("first_name", fields.first_name.clone());
                updates.set_opt("last_name", fields.last_name.clone());
                updates.set_opt("email", fields.email.clone());
                if !updates.is_empty() {
                    let tx = self.conn.unchecked_transaction()?;
                    updates.apply(&tx, "student", student_id)?;
                    tx.commit()?;
                    debug!(student = student_id, "updated student");
                }
                self.find_student(student_id)
            }
        }
    }

    /// Deletes a student together with every submission they made.
    pub fn remove_student(&self, student_id: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        ensure_student_exists(&tx, student_id)?;
        let submissions = query_ids(
            &tx,
            "SELECT id FROM submitted_assignment WHERE student_id = ?",
            student_id,
        )?;
        for submission_id in &submissions {
            delete_submission_rows(&tx, submission_id)?;
        }
        tx.execute("DELETE FROM student WHERE id = ?", [student_id])?;
        tx.commit()?;
        info!(
            student = student_id,
            submissions = submissions.len(),
            "removed student"
        );
        Ok(())
    }
}
