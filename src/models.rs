use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
}

impl CellType {
    pub fn as_str(self) -> &'static str {
        match self {
            CellType::Code => "code",
            CellType::Markdown => "markdown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "code" => Some(CellType::Code),
            "markdown" => Some(CellType::Markdown),
            _ => None,
        }
    }

    /// Reads a stored cell type. The schema CHECK keeps other values out, so
    /// anything unexpected is reported as a conversion failure.
    pub(crate) fn from_column(idx: usize, s: String) -> rusqlite::Result<Self> {
        CellType::parse(&s).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                format!("unknown cell type: {s}").into(),
            )
        })
    }
}

// Projections. Field names match the gradebook's dictionary form.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub score: f64,
    pub max_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub id: String,
    pub name: String,
    pub duedate: Option<String>,
    pub num_submissions: i64,
    pub max_score: f64,
    pub max_code_score: f64,
    pub max_written_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notebook {
    pub id: String,
    pub name: String,
    pub assignment: String,
    pub kernelspec: Option<String>,
    pub num_submissions: i64,
    pub max_score: f64,
    pub max_code_score: f64,
    pub max_written_score: f64,
    pub needs_manual_grade: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GradeCell {
    pub id: String,
    pub name: String,
    pub max_score: f64,
    pub cell_type: CellType,
    pub notebook: String,
    pub assignment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SolutionCell {
    pub id: String,
    pub name: String,
    pub notebook: String,
    pub assignment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceCell {
    pub id: String,
    pub name: String,
    pub cell_type: CellType,
    pub locked: bool,
    pub source: Option<String>,
    pub checksum: Option<String>,
    pub notebook: String,
    pub assignment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmittedAssignment {
    pub id: String,
    pub name: String,
    pub student: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub timestamp: Option<String>,
    /// Extension in seconds.
    pub extension: Option<f64>,
    pub duedate: Option<String>,
    pub total_seconds_late: f64,
    pub score: f64,
    pub max_score: f64,
    pub code_score: f64,
    pub max_code_score: f64,
    pub written_score: f64,
    pub max_written_score: f64,
    pub needs_manual_grade: bool,
    pub late_submission_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmittedNotebook {
    pub id: String,
    pub name: String,
    pub assignment: String,
    pub student: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub score: f64,
    pub max_score: f64,
    pub code_score: f64,
    pub max_code_score: f64,
    pub written_score: f64,
    pub max_written_score: f64,
    pub needs_manual_grade: bool,
    pub failed_tests: bool,
    pub flagged: bool,
    pub late_submission_penalty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grade {
    pub id: String,
    pub name: String,
    pub notebook: String,
    pub assignment: String,
    pub student: String,
    pub auto_score: Option<f64>,
    pub manual_score: Option<f64>,
    pub extra_credit: Option<f64>,
    pub max_score: f64,
    pub needs_manual_grade: bool,
    pub failed_tests: bool,
    pub cell_type: CellType,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comment {
    pub id: String,
    pub name: String,
    pub notebook: String,
    pub assignment: String,
    pub student: String,
    pub auto_comment: Option<String>,
    pub manual_comment: Option<String>,
    pub comment: Option<String>,
}

// Field sets for add / update-or-create. `None` leaves a column untouched;
// `Some(None)` clears a nullable column.

#[derive(Debug, Clone, Default)]
pub struct StudentFields {
    pub first_name: Option<Option<String>>,
    pub last_name: Option<Option<String>>,
    pub email: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentFields {
    pub duedate: Option<Option<NaiveDateTime>>,
}

#[derive(Debug, Clone, Default)]
pub struct NotebookFields {
    pub kernelspec: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct GradeCellFields {
    pub max_score: Option<f64>,
    pub cell_type: Option<CellType>,
}

#[derive(Debug, Clone, Default)]
pub struct SourceCellFields {
    pub cell_type: Option<CellType>,
    pub locked: Option<bool>,
    pub source: Option<Option<String>>,
    pub checksum: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmissionFields {
    pub timestamp: Option<Option<NaiveDateTime>>,
    /// Extension in seconds.
    pub extension: Option<Option<f64>>,
}

#[derive(Debug, Clone, Default)]
pub struct SubmittedNotebookFields {
    pub flagged: Option<bool>,
    pub late_submission_penalty: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct GradeFields {
    pub auto_score: Option<Option<f64>>,
    pub manual_score: Option<Option<f64>>,
    pub extra_credit: Option<Option<f64>>,
    pub needs_manual_grade: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct CommentFields {
    pub auto_comment: Option<Option<String>>,
    pub manual_comment: Option<Option<String>>,
}

/// Desired definition of a grade cell when syncing a notebook's structure.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeCellSpec {
    pub name: String,
    pub max_score: f64,
    pub cell_type: CellType,
}
