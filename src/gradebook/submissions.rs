use super::{
    delete_submission_notebook_rows, delete_submission_rows, ensure_student_exists, new_id,
    query_ids, resolve_assignment_id, resolve_notebook_id, resolve_submission_id,
    resolve_submission_notebook_id, ColumnUpdates, Gradebook,
};
use crate::calc;
use crate::dates;
use crate::error::{GradebookError, Result};
use crate::models::{
    CellType, SubmissionFields, SubmittedAssignment, SubmittedNotebook, SubmittedNotebookFields,
};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::{debug, info};

pub(crate) const SUBMISSION_ORDER: &str = "ORDER BY a.duedate, a.name, s.last_name, s.first_name, s.id";
pub(crate) const SUBMISSION_NOTEBOOK_ORDER: &str =
    "ORDER BY a.duedate, a.name, n.name, s.last_name, s.first_name, s.id";

fn submission_select_sql(where_clause: &str) -> String {
    format!(
        "SELECT sa.id, a.name, sa.student_id, s.first_name, s.last_name,
                sa.timestamp, sa.extension_seconds, a.duedate,
                {}, {}, {}, {}, {}, {}, {}, {}
         FROM submitted_assignment sa
         JOIN assignment a ON a.id = sa.assignment_id
         JOIN student s ON s.id = sa.student_id
         {where_clause}
         {SUBMISSION_ORDER}",
        calc::submitted_assignment_score_sql("sa.id", None),
        calc::assignment_max_score_sql("a.id", None),
        calc::submitted_assignment_score_sql("sa.id", Some(CellType::Code)),
        calc::assignment_max_score_sql("a.id", Some(CellType::Code)),
        calc::submitted_assignment_score_sql("sa.id", Some(CellType::Markdown)),
        calc::assignment_max_score_sql("a.id", Some(CellType::Markdown)),
        calc::submitted_assignment_needs_manual_grade_sql("sa.id"),
        calc::submitted_assignment_late_penalty_sql("sa.id"),
    )
}

/// Maps the submission column layout shared with the bulk query in `stats`.
pub(crate) fn submission_from_row(row: &Row<'_>) -> rusqlite::Result<SubmittedAssignment> {
    let timestamp = dates::from_column(row.get(5)?);
    let extension: Option<f64> = row.get(6)?;
    let duedate = dates::from_column(row.get(7)?);
    Ok(SubmittedAssignment {
        id: row.get(0)?,
        name: row.get(1)?,
        student: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        timestamp: timestamp.as_ref().map(dates::format_utc),
        extension,
        duedate: calc::effective_duedate(duedate, extension).map(|d| dates::format_utc(&d)),
        total_seconds_late: calc::total_seconds_late(timestamp, duedate, extension),
        score: row.get(8)?,
        max_score: row.get(9)?,
        code_score: row.get(10)?,
        max_code_score: row.get(11)?,
        written_score: row.get(12)?,
        max_written_score: row.get(13)?,
        needs_manual_grade: row.get(14)?,
        late_submission_penalty: row.get(15)?,
    })
}

fn load_submission(conn: &Connection, assignment: &str, student: &str) -> Result<SubmittedAssignment> {
    conn.query_row(
        &submission_select_sql("WHERE a.name = ? AND sa.student_id = ?"),
        [assignment, student],
        submission_from_row,
    )
    .optional()?
    .ok_or_else(|| {
        GradebookError::missing(format!("No such submission: {assignment} for {student}"))
    })
}

fn submission_notebook_select_sql(where_clause: &str) -> String {
    format!(
        "SELECT sn.id, n.name, a.name, sa.student_id, s.first_name, s.last_name,
                {}, {}, {}, {}, {}, {}, {}, {},
                sn.flagged, sn.late_submission_penalty
         FROM submitted_notebook sn
         JOIN notebook n ON n.id = sn.notebook_id
         JOIN submitted_assignment sa ON sa.id = sn.assignment_id
         JOIN assignment a ON a.id = sa.assignment_id
         JOIN student s ON s.id = sa.student_id
         {where_clause}
         {SUBMISSION_NOTEBOOK_ORDER}",
        calc::submitted_notebook_score_sql("sn.id", None),
        calc::notebook_max_score_sql("n.id", None),
        calc::submitted_notebook_score_sql("sn.id", Some(CellType::Code)),
        calc::notebook_max_score_sql("n.id", Some(CellType::Code)),
        calc::submitted_notebook_score_sql("sn.id", Some(CellType::Markdown)),
        calc::notebook_max_score_sql("n.id", Some(CellType::Markdown)),
        calc::submitted_notebook_needs_manual_grade_sql("sn.id"),
        calc::submitted_notebook_failed_tests_sql("sn.id"),
    )
}

/// Maps the submitted-notebook column layout shared with the bulk query in
/// `stats`.
pub(crate) fn submission_notebook_from_row(row: &Row<'_>) -> rusqlite::Result<SubmittedNotebook> {
    Ok(SubmittedNotebook {
        id: row.get(0)?,
        name: row.get(1)?,
        assignment: row.get(2)?,
        student: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        score: row.get(6)?,
        max_score: row.get(7)?,
        code_score: row.get(8)?,
        max_code_score: row.get(9)?,
        written_score: row.get(10)?,
        max_written_score: row.get(11)?,
        needs_manual_grade: row.get(12)?,
        failed_tests: row.get(13)?,
        flagged: row.get(14)?,
        late_submission_penalty: row.get(15)?,
    })
}

fn load_submission_notebook_by_id(conn: &Connection, id: &str) -> Result<SubmittedNotebook> {
    conn.query_row(
        &submission_notebook_select_sql("WHERE sn.id = ?"),
        [id],
        submission_notebook_from_row,
    )
    .optional()?
    .ok_or_else(|| GradebookError::missing(format!("No such submitted notebook: {id}")))
}

/// Copies one notebook's grade and solution cells into a submission as
/// ungraded grades and empty comments.
fn mirror_notebook(conn: &Connection, submission_id: &str, notebook_id: &str) -> Result<String> {
    let submitted_notebook_id = new_id();
    conn.execute(
        "INSERT INTO submitted_notebook(id, assignment_id, notebook_id) VALUES(?, ?, ?)",
        (&submitted_notebook_id, submission_id, notebook_id),
    )?;
    for cell_id in query_ids(conn, "SELECT id FROM grade_cell WHERE notebook_id = ?", notebook_id)? {
        conn.execute(
            "INSERT INTO grade(id, notebook_id, cell_id, needs_manual_grade) VALUES(?, ?, ?, 1)",
            (new_id(), &submitted_notebook_id, &cell_id),
        )?;
    }
    for cell_id in query_ids(conn, "SELECT id FROM solution_cell WHERE notebook_id = ?", notebook_id)? {
        conn.execute(
            "INSERT INTO comment(id, notebook_id, cell_id) VALUES(?, ?, ?)",
            (new_id(), &submitted_notebook_id, &cell_id),
        )?;
    }
    Ok(submitted_notebook_id)
}

fn validate_extension(extension: Option<Option<f64>>) -> Result<()> {
    if let Some(Some(secs)) = extension {
        if !secs.is_finite() {
            return Err(GradebookError::invalid(format!("invalid extension: {secs}")));
        }
    }
    Ok(())
}

impl Gradebook {
    /// Creates a submission and mirrors every notebook, grade cell and
    /// solution cell of the assignment into it.
    pub fn add_submission(
        &self,
        assignment: &str,
        student: &str,
        fields: &SubmissionFields,
    ) -> Result<SubmittedAssignment> {
        validate_extension(fields.extension)?;
        let tx = self.conn.unchecked_transaction()?;
        let assignment_id = resolve_assignment_id(&tx, assignment)?;
        ensure_student_exists(&tx, student)?;

        let submission_id = new_id();
        tx.execute(
            "INSERT INTO submitted_assignment(id, assignment_id, student_id, timestamp, extension_seconds)
             VALUES(?, ?, ?, ?, ?)",
            (
                &submission_id,
                &assignment_id,
                student,
                fields.timestamp.flatten().map(|t| dates::format_utc(&t)),
                fields.extension.flatten(),
            ),
        )?;
        let notebooks = query_ids(
            &tx,
            "SELECT id FROM notebook WHERE assignment_id = ? ORDER BY name",
            &assignment_id,
        )?;
        for notebook_id in &notebooks {
            mirror_notebook(&tx, &submission_id, notebook_id)?;
        }
        tx.commit()?;
        info!(assignment, student, notebooks = notebooks.len(), "added submission");
        load_submission(&self.conn, assignment, student)
    }

    pub fn find_submission(&self, assignment: &str, student: &str) -> Result<SubmittedAssignment> {
        resolve_assignment_id(&self.conn, assignment)?;
        ensure_student_exists(&self.conn, student)?;
        load_submission(&self.conn, assignment, student)
    }

    pub fn update_or_create_submission(
        &self,
        assignment: &str,
        student: &str,
        fields: &SubmissionFields,
    ) -> Result<SubmittedAssignment> {
        match self.find_submission(assignment, student) {
            Err(GradebookError::MissingEntry(_)) => self.add_submission(assignment, student, fields),
            Err(e) => Err(e),
            Ok(existing) => {
                validate_extension(fields.extension)?;
                let mut updates = ColumnUpdates::default();
                updates.set_opt(
                    "timestamp",
                    fields.timestamp.map(|t| t.map(|t| dates::format_utc(&t))),
                );
                updates.set_opt("extension_seconds", fields.extension);
                if !updates.is_empty() {
                    let tx = self.conn.unchecked_transaction()?;
                    updates.apply(&tx, "submitted_assignment", &existing.id)?;
                    tx.commit()?;
                    debug!(assignment, student, "updated submission");
                }
                load_submission(&self.conn, assignment, student)
            }
        }
    }

    pub fn remove_submission(&self, assignment: &str, student: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let submission_id = resolve_submission_id(&tx, assignment, student)?;
        delete_submission_rows(&tx, &submission_id)?;
        tx.commit()?;
        info!(assignment, student, "removed submission");
        Ok(())
    }

    /// Submissions to one assignment, ordered by student name.
    pub fn assignment_submissions(&self, assignment: &str) -> Result<Vec<SubmittedAssignment>> {
        resolve_assignment_id(&self.conn, assignment)?;
        let mut stmt = self.conn.prepare(&submission_select_sql("WHERE a.name = ?"))?;
        let rows = stmt
            .query_map([assignment], submission_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Submissions made by one student, in assignment order.
    pub fn student_submissions(&self, student: &str) -> Result<Vec<SubmittedAssignment>> {
        ensure_student_exists(&self.conn, student)?;
        let mut stmt = self
            .conn
            .prepare(&submission_select_sql("WHERE sa.student_id = ?"))?;
        let rows = stmt
            .query_map([student], submission_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Mirrors one notebook into an existing submission that lacks it.
    pub fn add_submission_notebook(
        &self,
        notebook: &str,
        assignment: &str,
        student: &str,
    ) -> Result<SubmittedNotebook> {
        let tx = self.conn.unchecked_transaction()?;
        let notebook_id = resolve_notebook_id(&tx, notebook, assignment)?;
        let submission_id = resolve_submission_id(&tx, assignment, student)?;
        let id = mirror_notebook(&tx, &submission_id, &notebook_id)?;
        tx.commit()?;
        info!(assignment, notebook, student, "added submitted notebook");
        load_submission_notebook_by_id(&self.conn, &id)
    }

    pub fn find_submission_notebook(
        &self,
        notebook: &str,
        assignment: &str,
        student: &str,
    ) -> Result<SubmittedNotebook> {
        let id = resolve_submission_notebook_id(&self.conn, notebook, assignment, student)?;
        load_submission_notebook_by_id(&self.conn, &id)
    }

    pub fn find_submission_notebook_by_id(&self, id: &str) -> Result<SubmittedNotebook> {
        load_submission_notebook_by_id(&self.conn, id)
    }

    pub fn update_or_create_submission_notebook(
        &self,
        notebook: &str,
        assignment: &str,
        student: &str,
        fields: &SubmittedNotebookFields,
    ) -> Result<SubmittedNotebook> {
        let tx = self.conn.unchecked_transaction()?;
        let (id, created) = match resolve_submission_notebook_id(&tx, notebook, assignment, student)
        {
            Err(GradebookError::MissingEntry(_)) => {
                let notebook_id = resolve_notebook_id(&tx, notebook, assignment)?;
                let submission_id = resolve_submission_id(&tx, assignment, student)?;
                (mirror_notebook(&tx, &submission_id, &notebook_id)?, true)
            }
            other => (other?, false),
        };
        if let Some(penalty) = fields.late_submission_penalty {
            if penalty.is_nan() || penalty < 0.0 {
                return Err(GradebookError::invalid(format!(
                    "late_submission_penalty must be >= 0, got {penalty}"
                )));
            }
        }
        let mut updates = ColumnUpdates::default();
        updates.set_opt("flagged", fields.flagged);
        updates.set_opt("late_submission_penalty", fields.late_submission_penalty);
        if !updates.is_empty() {
            updates.apply(&tx, "submitted_notebook", &id)?;
            debug!(assignment, notebook, student, "updated submitted notebook");
        }
        tx.commit()?;
        if created {
            info!(assignment, notebook, student, "added submitted notebook");
        }
        load_submission_notebook_by_id(&self.conn, &id)
    }

    pub fn remove_submission_notebook(
        &self,
        notebook: &str,
        assignment: &str,
        student: &str,
    ) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let id = resolve_submission_notebook_id(&tx, notebook, assignment, student)?;
        delete_submission_notebook_rows(&tx, &id)?;
        tx.commit()?;
        info!(assignment, notebook, student, "removed submitted notebook");
        Ok(())
    }

    /// Every submitted copy of one notebook, ordered by student name.
    pub fn notebook_submissions(
        &self,
        notebook: &str,
        assignment: &str,
    ) -> Result<Vec<SubmittedNotebook>> {
        let notebook_id = resolve_notebook_id(&self.conn, notebook, assignment)?;
        let mut stmt = self
            .conn
            .prepare(&submission_notebook_select_sql("WHERE n.id = ?"))?;
        let rows = stmt
            .query_map([&notebook_id], submission_notebook_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Submitted notebooks belonging to one submission, ordered by notebook.
    pub fn submission_notebooks(
        &self,
        assignment: &str,
        student: &str,
    ) -> Result<Vec<SubmittedNotebook>> {
        let submission_id = resolve_submission_id(&self.conn, assignment, student)?;
        let mut stmt = self
            .conn
            .prepare(&submission_notebook_select_sql("WHERE sa.id = ?"))?;
        let rows = stmt
            .query_map([&submission_id], submission_notebook_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
