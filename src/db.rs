use crate::backup::DB_FILE_NAME;
use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE_NAME);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

#[cfg(test)]
pub fn open_in_memory() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignment(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            duedate TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS notebook(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            assignment_id TEXT NOT NULL,
            kernelspec TEXT,
            FOREIGN KEY(assignment_id) REFERENCES assignment(id),
            UNIQUE(name, assignment_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_notebook_assignment ON notebook(assignment_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade_cell(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            max_score REAL NOT NULL CHECK(max_score >= 0),
            cell_type TEXT NOT NULL CHECK(cell_type IN ('code', 'markdown')),
            notebook_id TEXT NOT NULL,
            FOREIGN KEY(notebook_id) REFERENCES notebook(id),
            UNIQUE(name, notebook_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_cell_notebook ON grade_cell(notebook_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS solution_cell(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            notebook_id TEXT NOT NULL,
            FOREIGN KEY(notebook_id) REFERENCES notebook(id),
            UNIQUE(name, notebook_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_solution_cell_notebook ON solution_cell(notebook_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS source_cell(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            cell_type TEXT NOT NULL CHECK(cell_type IN ('code', 'markdown')),
            locked INTEGER NOT NULL DEFAULT 0,
            source TEXT,
            checksum TEXT,
            notebook_id TEXT NOT NULL,
            FOREIGN KEY(notebook_id) REFERENCES notebook(id),
            UNIQUE(name, notebook_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_source_cell_notebook ON source_cell(notebook_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS student(
            id TEXT PRIMARY KEY,
            first_name TEXT,
            last_name TEXT,
            email TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS submitted_assignment(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            student_id TEXT NOT NULL,
            timestamp TEXT,
            extension_seconds REAL,
            FOREIGN KEY(assignment_id) REFERENCES assignment(id),
            FOREIGN KEY(student_id) REFERENCES student(id),
            UNIQUE(assignment_id, student_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submitted_assignment_assignment ON submitted_assignment(assignment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submitted_assignment_student ON submitted_assignment(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS submitted_notebook(
            id TEXT PRIMARY KEY,
            assignment_id TEXT NOT NULL,
            notebook_id TEXT NOT NULL,
            flagged INTEGER NOT NULL DEFAULT 0,
            late_submission_penalty REAL NOT NULL DEFAULT 0 CHECK(late_submission_penalty >= 0),
            FOREIGN KEY(assignment_id) REFERENCES submitted_assignment(id),
            FOREIGN KEY(notebook_id) REFERENCES notebook(id),
            UNIQUE(notebook_id, assignment_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submitted_notebook_assignment ON submitted_notebook(assignment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_submitted_notebook_notebook ON submitted_notebook(notebook_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grade(
            id TEXT PRIMARY KEY,
            notebook_id TEXT NOT NULL,
            cell_id TEXT NOT NULL,
            auto_score REAL,
            manual_score REAL,
            extra_credit REAL,
            needs_manual_grade INTEGER NOT NULL DEFAULT 1,
            FOREIGN KEY(notebook_id) REFERENCES submitted_notebook(id),
            FOREIGN KEY(cell_id) REFERENCES grade_cell(id),
            UNIQUE(cell_id, notebook_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_notebook ON grade(notebook_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grade_cell ON grade(cell_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS comment(
            id TEXT PRIMARY KEY,
            notebook_id TEXT NOT NULL,
            cell_id TEXT NOT NULL,
            auto_comment TEXT,
            manual_comment TEXT,
            FOREIGN KEY(notebook_id) REFERENCES submitted_notebook(id),
            FOREIGN KEY(cell_id) REFERENCES solution_cell(id),
            UNIQUE(cell_id, notebook_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_comment_notebook ON comment(notebook_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_comment_cell ON comment(cell_id)",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
pub(crate) fn table_row_count(conn: &Connection, table: &str) -> i64 {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    conn.query_row(&sql, [], |r| r.get(0)).unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_is_idempotent() {
        let conn = open_in_memory().expect("open");
        init_schema(&conn).expect("second init");
        assert_eq!(table_row_count(&conn, "assignment"), 0);
        assert_eq!(table_row_count(&conn, "grade"), 0);
    }

    #[test]
    fn grade_cell_type_is_checked() {
        let conn = open_in_memory().expect("open");
        conn.execute("INSERT INTO assignment(id, name) VALUES('a', 'foo')", [])
            .expect("assignment");
        conn.execute(
            "INSERT INTO notebook(id, name, assignment_id) VALUES('n', 'p1', 'a')",
            [],
        )
        .expect("notebook");
        let res = conn.execute(
            "INSERT INTO grade_cell(id, name, max_score, cell_type, notebook_id)
             VALUES('g', 'test1', 1, 'raw', 'n')",
            [],
        );
        assert!(res.is_err());
    }
}
