use super::{resolve_submission_notebook_id, ColumnUpdates, Gradebook};
use crate::calc;
use crate::error::{GradebookError, Result};
use crate::models::{CellType, Comment, CommentFields, Grade, GradeFields};
use rusqlite::{Connection, OptionalExtension, Row};
use tracing::debug;

const SUBMITTED_SCOPE_JOIN: &str = "JOIN submitted_notebook sn ON sn.id = x.notebook_id
         JOIN notebook n ON n.id = sn.notebook_id
         JOIN submitted_assignment sa ON sa.id = sn.assignment_id
         JOIN assignment a ON a.id = sa.assignment_id";

fn grade_select_sql(where_clause: &str) -> String {
    format!(
        "SELECT x.id, gc.name, n.name, a.name, sa.student_id,
                x.auto_score, x.manual_score, x.extra_credit,
                gc.max_score, x.needs_manual_grade, gc.cell_type
         FROM grade x
         JOIN grade_cell gc ON gc.id = x.cell_id
         {SUBMITTED_SCOPE_JOIN}
         {where_clause}
         ORDER BY gc.name"
    )
}

fn grade_from_row(row: &Row<'_>) -> rusqlite::Result<Grade> {
    let auto_score: Option<f64> = row.get(5)?;
    let manual_score: Option<f64> = row.get(6)?;
    let extra_credit: Option<f64> = row.get(7)?;
    let max_score: f64 = row.get(8)?;
    let cell_type = CellType::from_column(10, row.get(10)?)?;
    Ok(Grade {
        id: row.get(0)?,
        name: row.get(1)?,
        notebook: row.get(2)?,
        assignment: row.get(3)?,
        student: row.get(4)?,
        auto_score,
        manual_score,
        extra_credit,
        max_score,
        needs_manual_grade: row.get(9)?,
        failed_tests: calc::grade_failed_tests(cell_type, auto_score, max_score),
        cell_type,
        score: calc::grade_score(auto_score, manual_score, extra_credit),
    })
}

fn load_grade_by_id(conn: &Connection, id: &str) -> Result<Grade> {
    conn.query_row(&grade_select_sql("WHERE x.id = ?"), [id], grade_from_row)
        .optional()?
        .ok_or_else(|| GradebookError::missing(format!("No such grade: {id}")))
}

fn comment_select_sql(where_clause: &str) -> String {
    format!(
        "SELECT x.id, sc.name, n.name, a.name, sa.student_id, x.auto_comment, x.manual_comment
         FROM comment x
         JOIN solution_cell sc ON sc.id = x.cell_id
         {SUBMITTED_SCOPE_JOIN}
         {where_clause}
         ORDER BY sc.name"
    )
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<Comment> {
    let auto_comment: Option<String> = row.get(5)?;
    let manual_comment: Option<String> = row.get(6)?;
    Ok(Comment {
        id: row.get(0)?,
        name: row.get(1)?,
        notebook: row.get(2)?,
        assignment: row.get(3)?,
        student: row.get(4)?,
        comment: calc::comment_text(auto_comment.as_deref(), manual_comment.as_deref()),
        auto_comment,
        manual_comment,
    })
}

fn load_comment_by_id(conn: &Connection, id: &str) -> Result<Comment> {
    conn.query_row(&comment_select_sql("WHERE x.id = ?"), [id], comment_from_row)
        .optional()?
        .ok_or_else(|| GradebookError::missing(format!("No such comment: {id}")))
}

fn check_score(label: &str, value: Option<Option<f64>>) -> Result<()> {
    match value {
        Some(Some(v)) if !v.is_finite() => {
            Err(GradebookError::invalid(format!("{label} must be a finite number")))
        }
        _ => Ok(()),
    }
}

fn grade_updates(fields: &GradeFields) -> Result<ColumnUpdates> {
    check_score("auto_score", fields.auto_score)?;
    check_score("manual_score", fields.manual_score)?;
    check_score("extra_credit", fields.extra_credit)?;
    let mut updates = ColumnUpdates::default();
    updates.set_opt("auto_score", fields.auto_score);
    updates.set_opt("manual_score", fields.manual_score);
    updates.set_opt("extra_credit", fields.extra_credit);
    updates.set_opt("needs_manual_grade", fields.needs_manual_grade);
    Ok(updates)
}

impl Gradebook {
    /// Grade for one grade cell in a student's submitted notebook.
    pub fn find_grade(
        &self,
        grade_cell: &str,
        notebook: &str,
        assignment: &str,
        student: &str,
    ) -> Result<Grade> {
        let submitted = resolve_submission_notebook_id(&self.conn, notebook, assignment, student)?;
        self.conn
            .query_row(
                &grade_select_sql("WHERE x.notebook_id = ? AND gc.name = ?"),
                [submitted.as_str(), grade_cell],
                grade_from_row,
            )
            .optional()?
            .ok_or_else(|| {
                GradebookError::missing(format!(
                    "No such grade: {assignment}/{notebook}/{grade_cell} for {student}"
                ))
            })
    }

    pub fn find_grade_by_id(&self, id: &str) -> Result<Grade> {
        load_grade_by_id(&self.conn, id)
    }

    /// Writes exactly the supplied grade fields.
    pub fn update_grade(&self, id: &str, fields: &GradeFields) -> Result<Grade> {
        let updates = grade_updates(fields)?;
        let tx = self.conn.unchecked_transaction()?;
        load_grade_by_id(&tx, id)?;
        updates.apply(&tx, "grade", id)?;
        tx.commit()?;
        debug!(grade = id, "updated grade");
        load_grade_by_id(&self.conn, id)
    }

    /// Records a grader's edit. Unless `needs_manual_grade` is supplied it is
    /// recomputed afterwards: a grade needs review only while it has neither
    /// a manual nor an auto score.
    pub fn review_grade(&self, id: &str, fields: &GradeFields) -> Result<Grade> {
        let updates = grade_updates(fields)?;
        let tx = self.conn.unchecked_transaction()?;
        load_grade_by_id(&tx, id)?;
        updates.apply(&tx, "grade", id)?;
        if fields.needs_manual_grade.is_none() {
            tx.execute(
                "UPDATE grade
                 SET needs_manual_grade = (manual_score IS NULL AND auto_score IS NULL)
                 WHERE id = ?",
                [id],
            )?;
        }
        tx.commit()?;
        debug!(grade = id, "reviewed grade");
        load_grade_by_id(&self.conn, id)
    }

    /// Grades of one submitted notebook, ordered by cell name.
    pub fn grades(&self, notebook: &str, assignment: &str, student: &str) -> Result<Vec<Grade>> {
        let submitted = resolve_submission_notebook_id(&self.conn, notebook, assignment, student)?;
        let mut stmt = self.conn.prepare(&grade_select_sql("WHERE x.notebook_id = ?"))?;
        let rows = stmt
            .query_map([&submitted], grade_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn find_comment(
        &self,
        solution_cell: &str,
        notebook: &str,
        assignment: &str,
        student: &str,
    ) -> Result<Comment> {
        let submitted = resolve_submission_notebook_id(&self.conn, notebook, assignment, student)?;
        self.conn
            .query_row(
                &comment_select_sql("WHERE x.notebook_id = ? AND sc.name = ?"),
                [submitted.as_str(), solution_cell],
                comment_from_row,
            )
            .optional()?
            .ok_or_else(|| {
                GradebookError::missing(format!(
                    "No such comment: {assignment}/{notebook}/{solution_cell} for {student}"
                ))
            })
    }

    pub fn find_comment_by_id(&self, id: &str) -> Result<Comment> {
        load_comment_by_id(&self.conn, id)
    }

    pub fn update_comment(&self, id: &str, fields: &CommentFields) -> Result<Comment> {
        let mut updates = ColumnUpdates::default();
        updates.set_opt("auto_comment", fields.auto_comment.clone());
        updates.set_opt("manual_comment", fields.manual_comment.clone());
        let tx = self.conn.unchecked_transaction()?;
        load_comment_by_id(&tx, id)?;
        updates.apply(&tx, "comment", id)?;
        tx.commit()?;
        debug!(comment = id, "updated comment");
        load_comment_by_id(&self.conn, id)
    }

    pub fn comments(&self, notebook: &str, assignment: &str, student: &str) -> Result<Vec<Comment>> {
        let submitted = resolve_submission_notebook_id(&self.conn, notebook, assignment, student)?;
        let mut stmt = self.conn.prepare(&comment_select_sql("WHERE x.notebook_id = ?"))?;
        let rows = stmt
            .query_map([&submitted], comment_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
