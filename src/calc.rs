//! Derived gradebook values.
//!
//! Nothing here is stored. Grade-level values are plain functions over a
//! loaded row; every aggregate is a correlated subquery evaluated when the
//! owning row is read, so it can never go stale.

use crate::models::CellType;
use chrono::{Duration, NaiveDateTime};
use sha2::{Digest, Sha256};

/// Score of one grade row (alias `g`). Manual wins over auto whenever it is
/// non-null, including an explicit 0.
pub const GRADE_SCORE_SQL: &str = "(CASE
    WHEN g.manual_score IS NOT NULL THEN g.manual_score + COALESCE(g.extra_credit, 0.0)
    WHEN g.auto_score IS NOT NULL THEN g.auto_score + COALESCE(g.extra_credit, 0.0)
    ELSE 0.0
  END)";

/// Failed-tests flag of one grade row joined to its cell (aliases `g`, `gc`).
pub const GRADE_FAILED_TESTS_SQL: &str = "(gc.cell_type = 'code'
    AND g.auto_score IS NOT NULL
    AND g.auto_score < gc.max_score)";

pub fn grade_score(auto_score: Option<f64>, manual_score: Option<f64>, extra_credit: Option<f64>) -> f64 {
    let extra = extra_credit.unwrap_or(0.0);
    match (manual_score, auto_score) {
        (Some(m), _) => m + extra,
        (None, Some(a)) => a + extra,
        (None, None) => 0.0,
    }
}

pub fn grade_failed_tests(cell_type: CellType, auto_score: Option<f64>, max_score: f64) -> bool {
    match (cell_type, auto_score) {
        (CellType::Code, Some(a)) => a < max_score,
        _ => false,
    }
}

pub fn comment_text(auto_comment: Option<&str>, manual_comment: Option<&str>) -> Option<String> {
    manual_comment.or(auto_comment).map(str::to_string)
}

pub fn effective_duedate(
    duedate: Option<NaiveDateTime>,
    extension_seconds: Option<f64>,
) -> Option<NaiveDateTime> {
    let due = duedate?;
    let Some(secs) = extension_seconds else {
        return Some(due);
    };
    let extended = Duration::try_milliseconds((secs * 1000.0).round() as i64)
        .and_then(|ext| due.checked_add_signed(ext));
    // Extensions past the calendar range saturate at its bounds.
    Some(extended.unwrap_or(if secs < 0.0 {
        NaiveDateTime::MIN
    } else {
        NaiveDateTime::MAX
    }))
}

pub fn total_seconds_late(
    timestamp: Option<NaiveDateTime>,
    duedate: Option<NaiveDateTime>,
    extension_seconds: Option<f64>,
) -> f64 {
    let (Some(ts), Some(due)) = (timestamp, effective_duedate(duedate, extension_seconds)) else {
        return 0.0;
    };
    let late = ts - due;
    let secs = late.num_milliseconds() as f64 / 1000.0;
    secs.max(0.0)
}

/// Content hash for a source cell.
pub fn compute_checksum(cell_type: CellType, source: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(cell_type.as_str().as_bytes());
    hasher.update(source.unwrap_or("").trim().as_bytes());
    format!("{:x}", hasher.finalize())
}

fn cell_type_pred(cell_type: Option<CellType>) -> String {
    match cell_type {
        Some(ct) => format!(" AND gc.cell_type = '{}'", ct.as_str()),
        None => String::new(),
    }
}

/// Sum of grade-cell max scores of one notebook.
pub fn notebook_max_score_sql(notebook_id: &str, cell_type: Option<CellType>) -> String {
    format!(
        "(SELECT COALESCE(SUM(gc.max_score), 0.0)
          FROM grade_cell gc
          WHERE gc.notebook_id = {notebook_id}{})",
        cell_type_pred(cell_type)
    )
}

/// Sum of grade-cell max scores over every notebook of one assignment.
pub fn assignment_max_score_sql(assignment_id: &str, cell_type: Option<CellType>) -> String {
    format!(
        "(SELECT COALESCE(SUM(gc.max_score), 0.0)
          FROM grade_cell gc
          JOIN notebook xn ON xn.id = gc.notebook_id
          WHERE xn.assignment_id = {assignment_id}{})",
        cell_type_pred(cell_type)
    )
}

/// Sum of every grade-cell max score in the gradebook.
pub const ALL_ASSIGNMENTS_MAX_SCORE_SQL: &str =
    "(SELECT COALESCE(SUM(gc.max_score), 0.0) FROM grade_cell gc)";

pub fn submitted_notebook_score_sql(submitted_notebook_id: &str, cell_type: Option<CellType>) -> String {
    format!(
        "(SELECT COALESCE(SUM({GRADE_SCORE_SQL}), 0.0)
          FROM grade g
          JOIN grade_cell gc ON gc.id = g.cell_id
          WHERE g.notebook_id = {submitted_notebook_id}{})",
        cell_type_pred(cell_type)
    )
}

pub fn submitted_assignment_score_sql(submission_id: &str, cell_type: Option<CellType>) -> String {
    format!(
        "(SELECT COALESCE(SUM({GRADE_SCORE_SQL}), 0.0)
          FROM grade g
          JOIN grade_cell gc ON gc.id = g.cell_id
          JOIN submitted_notebook xsn ON xsn.id = g.notebook_id
          WHERE xsn.assignment_id = {submission_id}{})",
        cell_type_pred(cell_type)
    )
}

pub fn student_score_sql(student_id: &str) -> String {
    format!(
        "(SELECT COALESCE(SUM({GRADE_SCORE_SQL}), 0.0)
          FROM grade g
          JOIN submitted_notebook xsn ON xsn.id = g.notebook_id
          JOIN submitted_assignment xsa ON xsa.id = xsn.assignment_id
          WHERE xsa.student_id = {student_id})"
    )
}

pub fn submitted_notebook_needs_manual_grade_sql(submitted_notebook_id: &str) -> String {
    format!(
        "EXISTS(SELECT 1 FROM grade g
          WHERE g.notebook_id = {submitted_notebook_id} AND g.needs_manual_grade = 1)"
    )
}

pub fn submitted_assignment_needs_manual_grade_sql(submission_id: &str) -> String {
    format!(
        "EXISTS(SELECT 1 FROM grade g
          JOIN submitted_notebook xsn ON xsn.id = g.notebook_id
          WHERE xsn.assignment_id = {submission_id} AND g.needs_manual_grade = 1)"
    )
}

pub fn notebook_needs_manual_grade_sql(notebook_id: &str) -> String {
    format!(
        "EXISTS(SELECT 1 FROM grade g
          JOIN submitted_notebook xsn ON xsn.id = g.notebook_id
          WHERE xsn.notebook_id = {notebook_id} AND g.needs_manual_grade = 1)"
    )
}

pub fn submitted_notebook_failed_tests_sql(submitted_notebook_id: &str) -> String {
    format!(
        "EXISTS(SELECT 1 FROM grade g
          JOIN grade_cell gc ON gc.id = g.cell_id
          WHERE g.notebook_id = {submitted_notebook_id} AND {GRADE_FAILED_TESTS_SQL})"
    )
}

pub fn submitted_assignment_late_penalty_sql(submission_id: &str) -> String {
    format!(
        "(SELECT COALESCE(SUM(xsn.late_submission_penalty), 0.0)
          FROM submitted_notebook xsn
          WHERE xsn.assignment_id = {submission_id})"
    )
}

pub fn assignment_num_submissions_sql(assignment_id: &str) -> String {
    format!(
        "(SELECT COUNT(*) FROM submitted_assignment xsa WHERE xsa.assignment_id = {assignment_id})"
    )
}

pub fn notebook_num_submissions_sql(notebook_id: &str) -> String {
    format!("(SELECT COUNT(*) FROM submitted_notebook xsn WHERE xsn.notebook_id = {notebook_id})")
}

/// Total grade score across every submission of one assignment (bound as `?1`).
pub fn assignment_score_total_sql(cell_type: Option<CellType>) -> String {
    format!(
        "SELECT COALESCE(SUM({GRADE_SCORE_SQL}), 0.0)
         FROM grade g
         JOIN grade_cell gc ON gc.id = g.cell_id
         JOIN notebook xn ON xn.id = gc.notebook_id
         WHERE xn.assignment_id = ?1{}",
        cell_type_pred(cell_type)
    )
}

/// Total grade score across every submission of one notebook (bound as `?1`).
pub fn notebook_score_total_sql(cell_type: Option<CellType>) -> String {
    format!(
        "SELECT COALESCE(SUM({GRADE_SCORE_SQL}), 0.0)
         FROM grade g
         JOIN grade_cell gc ON gc.id = g.cell_id
         WHERE gc.notebook_id = ?1{}",
        cell_type_pred(cell_type)
    )
}

pub fn average(total: f64, count: i64) -> f64 {
    if count > 0 {
        total / (count as f64)
    } else {
        0.0
    }
}
