use rusqlite::ErrorCode;

pub type Result<T> = std::result::Result<T, GradebookError>;

#[derive(Debug, thiserror::Error)]
pub enum GradebookError {
    #[error("{0}")]
    MissingEntry(String),

    #[error("{0}")]
    InvalidEntry(String),

    #[error("database error: {0}")]
    Database(rusqlite::Error),
}

impl GradebookError {
    /// Error code reported over the IPC channel.
    pub fn code(&self) -> &'static str {
        match self {
            GradebookError::MissingEntry(_) => "not_found",
            GradebookError::InvalidEntry(_) => "invalid_entry",
            GradebookError::Database(_) => "db_error",
        }
    }

    pub fn missing(message: impl Into<String>) -> Self {
        GradebookError::MissingEntry(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        GradebookError::InvalidEntry(message.into())
    }
}

impl From<rusqlite::Error> for GradebookError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(f, msg)
                if f.code == ErrorCode::ConstraintViolation =>
            {
                let detail = msg.clone().unwrap_or_else(|| f.to_string());
                GradebookError::InvalidEntry(format!("duplicate or invalid entry: {detail}"))
            }
            _ => GradebookError::Database(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn unique_violation_maps_to_invalid_entry() {
        let conn = Connection::open_in_memory().expect("open");
        conn.execute("CREATE TABLE t(name TEXT UNIQUE)", [])
            .expect("create");
        conn.execute("INSERT INTO t(name) VALUES('a')", [])
            .expect("insert");
        let e: GradebookError = conn
            .execute("INSERT INTO t(name) VALUES('a')", [])
            .expect_err("duplicate")
            .into();
        assert_eq!(e.code(), "invalid_entry");
    }

    #[test]
    fn other_errors_stay_database_errors() {
        let conn = Connection::open_in_memory().expect("open");
        let e: GradebookError = conn
            .execute("SELECT * FROM nope", [])
            .expect_err("missing table")
            .into();
        assert_eq!(e.code(), "db_error");
    }
}
