//! Averages and bulk projections.
//!
//! The bulk queries aggregate with grouped joins instead of per-row
//! subqueries, but their column layouts match the per-object projections so
//! the same row mappers are reused.

use super::students::student_from_row;
use super::submissions::{
    submission_from_row, submission_notebook_from_row, SUBMISSION_NOTEBOOK_ORDER, SUBMISSION_ORDER,
};
use super::{resolve_assignment_id, resolve_notebook_id, Gradebook};
use crate::calc::{self, GRADE_FAILED_TESTS_SQL, GRADE_SCORE_SQL};
use crate::error::Result;
use crate::models::{CellType, Student, SubmittedAssignment, SubmittedNotebook};
use rusqlite::Connection;

fn partial_score_sql(cell_type: CellType) -> String {
    format!(
        "COALESCE(SUM(CASE WHEN gc.cell_type = '{}' THEN {GRADE_SCORE_SQL} ELSE 0.0 END), 0.0)",
        cell_type.as_str()
    )
}

fn scalar(conn: &Connection, sql: &str, id: &str) -> Result<f64> {
    Ok(conn.query_row(sql, [id], |r| r.get(0))?)
}

fn count(conn: &Connection, sql: &str, id: &str) -> Result<i64> {
    Ok(conn.query_row(&format!("SELECT {sql}"), [id], |r| r.get(0))?)
}

impl Gradebook {
    fn average_assignment(&self, assignment: &str, cell_type: Option<CellType>) -> Result<f64> {
        let id = resolve_assignment_id(&self.conn, assignment)?;
        let total = scalar(&self.conn, &calc::assignment_score_total_sql(cell_type), &id)?;
        let n = count(&self.conn, &calc::assignment_num_submissions_sql("?1"), &id)?;
        Ok(calc::average(total, n))
    }

    fn average_notebook(
        &self,
        notebook: &str,
        assignment: &str,
        cell_type: Option<CellType>,
    ) -> Result<f64> {
        let id = resolve_notebook_id(&self.conn, notebook, assignment)?;
        let total = scalar(&self.conn, &calc::notebook_score_total_sql(cell_type), &id)?;
        let n = count(&self.conn, &calc::notebook_num_submissions_sql("?1"), &id)?;
        Ok(calc::average(total, n))
    }

    pub fn average_assignment_score(&self, assignment: &str) -> Result<f64> {
        self.average_assignment(assignment, None)
    }

    pub fn average_assignment_code_score(&self, assignment: &str) -> Result<f64> {
        self.average_assignment(assignment, Some(CellType::Code))
    }

    pub fn average_assignment_written_score(&self, assignment: &str) -> Result<f64> {
        self.average_assignment(assignment, Some(CellType::Markdown))
    }

    pub fn average_notebook_score(&self, notebook: &str, assignment: &str) -> Result<f64> {
        self.average_notebook(notebook, assignment, None)
    }

    pub fn average_notebook_code_score(&self, notebook: &str, assignment: &str) -> Result<f64> {
        self.average_notebook(notebook, assignment, Some(CellType::Code))
    }

    pub fn average_notebook_written_score(&self, notebook: &str, assignment: &str) -> Result<f64> {
        self.average_notebook(notebook, assignment, Some(CellType::Markdown))
    }

    /// Every student with score and max score, in one query.
    pub fn student_dicts(&self) -> Result<Vec<Student>> {
        let sql = format!(
            "SELECT s.id, s.first_name, s.last_name, s.email,
                    COALESCE(SUM({GRADE_SCORE_SQL}), 0.0),
                    {}
             FROM student s
             LEFT JOIN submitted_assignment sa ON sa.student_id = s.id
             LEFT JOIN submitted_notebook sn ON sn.assignment_id = sa.id
             LEFT JOIN grade g ON g.notebook_id = sn.id
             GROUP BY s.id
             ORDER BY s.last_name, s.first_name, s.id",
            calc::ALL_ASSIGNMENTS_MAX_SCORE_SQL,
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], student_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every submission to one assignment, in one query.
    pub fn submission_dicts(&self, assignment: &str) -> Result<Vec<SubmittedAssignment>> {
        let assignment_id = resolve_assignment_id(&self.conn, assignment)?;
        let sql = format!(
            "SELECT sa.id, a.name, sa.student_id, s.first_name, s.last_name,
                    sa.timestamp, sa.extension_seconds, a.duedate,
                    COALESCE(SUM({GRADE_SCORE_SQL}), 0.0), {},
                    {}, {},
                    {}, {},
                    COALESCE(MAX(g.needs_manual_grade), 0) = 1,
                    {}
             FROM submitted_assignment sa
             JOIN assignment a ON a.id = sa.assignment_id
             JOIN student s ON s.id = sa.student_id
             LEFT JOIN submitted_notebook sn ON sn.assignment_id = sa.id
             LEFT JOIN grade g ON g.notebook_id = sn.id
             LEFT JOIN grade_cell gc ON gc.id = g.cell_id
             WHERE sa.assignment_id = ?
             GROUP BY sa.id
             {SUBMISSION_ORDER}",
            calc::assignment_max_score_sql("a.id", None),
            partial_score_sql(CellType::Code),
            calc::assignment_max_score_sql("a.id", Some(CellType::Code)),
            partial_score_sql(CellType::Markdown),
            calc::assignment_max_score_sql("a.id", Some(CellType::Markdown)),
            calc::submitted_assignment_late_penalty_sql("sa.id"),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([&assignment_id], submission_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Every submitted copy of one notebook, in one query.
    pub fn notebook_submission_dicts(
        &self,
        notebook: &str,
        assignment: &str,
    ) -> Result<Vec<SubmittedNotebook>> {
        let notebook_id = resolve_notebook_id(&self.conn, notebook, assignment)?;
        let sql = format!(
            "SELECT sn.id, n.name, a.name, sa.student_id, s.first_name, s.last_name,
                    COALESCE(SUM({GRADE_SCORE_SQL}), 0.0), {},
                    {}, {},
                    {}, {},
                    COALESCE(MAX(g.needs_manual_grade), 0) = 1,
                    COALESCE(MAX(CASE WHEN {GRADE_FAILED_TESTS_SQL} THEN 1 ELSE 0 END), 0) = 1,
                    sn.flagged, sn.late_submission_penalty
             FROM submitted_notebook sn
             JOIN notebook n ON n.id = sn.notebook_id
             JOIN submitted_assignment sa ON sa.id = sn.assignment_id
             JOIN assignment a ON a.id = sa.assignment_id
             JOIN student s ON s.id = sa.student_id
             LEFT JOIN grade g ON g.notebook_id = sn.id
             LEFT JOIN grade_cell gc ON gc.id = g.cell_id
             WHERE sn.notebook_id = ?
             GROUP BY sn.id
             {SUBMISSION_NOTEBOOK_ORDER}",
            calc::notebook_max_score_sql("n.id", None),
            partial_score_sql(CellType::Code),
            calc::notebook_max_score_sql("n.id", Some(CellType::Code)),
            partial_score_sql(CellType::Markdown),
            calc::notebook_max_score_sql("n.id", Some(CellType::Markdown)),
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map([&notebook_id], submission_notebook_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
