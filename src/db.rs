use anyhow::Context;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::auth::{self, Role};
use crate::config::DB_FILE_NAME;

/// Likert scale seeded into an empty database.
pub const DEFAULT_OPTIONS: [(i64, &str); 5] = [
    (1, "Strongly Disagree"),
    (2, "Disagree"),
    (3, "Neutral"),
    (4, "Agree"),
    (5, "Strongly Agree"),
];

pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

pub fn open_db(data_dir: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(data_dir).with_context(|| {
        format!(
            "failed to create data directory {}",
            data_dir.to_string_lossy()
        )
    })?;
    let db_path = data_dir.join(DB_FILE_NAME);
    let conn = Connection::open(&db_path)
        .with_context(|| format!("failed to open database {}", db_path.to_string_lossy()))?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id TEXT PRIMARY KEY,
            id_number TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL CHECK(role IN ('STUDENT', 'ADMIN')),
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions(
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS programs(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS sections(
            id TEXT PRIMARY KEY,
            program_id TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(program_id) REFERENCES programs(id),
            UNIQUE(program_id, name)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sections_program ON sections(program_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS courses(
            id TEXT PRIMARY KEY,
            program_id TEXT NOT NULL,
            section_id TEXT NOT NULL,
            code TEXT NOT NULL,
            name TEXT NOT NULL,
            FOREIGN KEY(program_id) REFERENCES programs(id),
            FOREIGN KEY(section_id) REFERENCES sections(id),
            UNIQUE(program_id, section_id, code)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_courses_section ON courses(section_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers(
            id TEXT PRIMARY KEY,
            faculty_id TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students(
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE,
            id_number TEXT NOT NULL UNIQUE,
            full_name TEXT NOT NULL,
            program_id TEXT NOT NULL,
            section_id TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(program_id) REFERENCES programs(id),
            FOREIGN KEY(section_id) REFERENCES sections(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_section ON students(program_id, section_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS teachers_assigned(
            id TEXT PRIMARY KEY,
            teacher_id TEXT NOT NULL,
            program_id TEXT NOT NULL,
            section_id TEXT NOT NULL,
            course_id TEXT NOT NULL,
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(program_id) REFERENCES programs(id),
            FOREIGN KEY(section_id) REFERENCES sections(id),
            FOREIGN KEY(course_id) REFERENCES courses(id),
            UNIQUE(teacher_id, program_id, section_id, course_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_assigned_teacher ON teachers_assigned(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_teachers_assigned_section ON teachers_assigned(program_id, section_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            sort_order INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            id TEXT PRIMARY KEY,
            category_id TEXT NOT NULL,
            text TEXT NOT NULL,
            sort_order INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY(category_id) REFERENCES categories(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_category ON questions(category_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS options(
            id TEXT PRIMARY KEY,
            text TEXT NOT NULL,
            value INTEGER NOT NULL UNIQUE CHECK(value BETWEEN 1 AND 5)
        )",
        [],
    )?;

    // option_id carries no foreign key: a deleted option leaves its responses in
    // place and aggregation scores them as 0.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS responses(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            question_id TEXT NOT NULL,
            option_id TEXT NOT NULL,
            assignment_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(question_id) REFERENCES questions(id),
            FOREIGN KEY(assignment_id) REFERENCES teachers_assigned(id),
            UNIQUE(student_id, assignment_id, question_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_responses_teacher ON responses(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_responses_assignment ON responses(assignment_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_responses_student ON responses(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS suggestions(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            assignment_id TEXT NOT NULL,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL,
            FOREIGN KEY(student_id) REFERENCES students(id),
            FOREIGN KEY(teacher_id) REFERENCES teachers(id),
            FOREIGN KEY(assignment_id) REFERENCES teachers_assigned(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_suggestions_teacher ON suggestions(teacher_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS survey_status(
            id INTEGER PRIMARY KEY CHECK(id = 1),
            is_active INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    ensure_survey_status(conn)?;
    seed_default_options(conn)?;
    Ok(())
}

fn ensure_survey_status(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO survey_status(id, is_active, updated_at) VALUES(1, 0, ?)",
        [now_rfc3339()],
    )?;
    Ok(())
}

fn seed_default_options(conn: &Connection) -> anyhow::Result<()> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM options", [], |r| r.get(0))?;
    if count > 0 {
        return Ok(());
    }
    for (value, text) in DEFAULT_OPTIONS {
        conn.execute(
            "INSERT INTO options(id, text, value) VALUES(?, ?, ?)",
            (new_id(), text, value),
        )?;
    }
    Ok(())
}

/// Creates the configured admin account when the database has no admin yet.
/// Returns true when an account was created.
pub fn ensure_bootstrap_admin(
    conn: &Connection,
    id_number: &str,
    password: &str,
) -> anyhow::Result<bool> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM users WHERE role = ? LIMIT 1",
            [Role::Admin.as_str()],
            |r| r.get(0),
        )
        .optional()?;
    if existing.is_some() {
        return Ok(false);
    }
    conn.execute(
        "INSERT INTO users(id, id_number, full_name, password_hash, role, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            new_id(),
            id_number,
            "Administrator",
            auth::hash_password(password)?,
            Role::Admin.as_str(),
            now_rfc3339(),
        ),
    )
    .context("failed to create bootstrap admin")?;
    info!(id_number, "created bootstrap admin account");
    Ok(true)
}

pub fn survey_is_active(conn: &Connection) -> anyhow::Result<bool> {
    let active: i64 = conn.query_row(
        "SELECT is_active FROM survey_status WHERE id = 1",
        [],
        |r| r.get(0),
    )?;
    Ok(active != 0)
}

pub fn set_survey_active(conn: &Connection, active: bool) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE survey_status SET is_active = ?, updated_at = ? WHERE id = 1",
        (active as i64, now_rfc3339()),
    )?;
    Ok(())
}

pub fn exists(conn: &Connection, table: &str, id: &str) -> anyhow::Result<bool> {
    let sql = format!("SELECT 1 FROM {} WHERE id = ?", table);
    let found: Option<i64> = conn.query_row(&sql, [id], |r| r.get(0)).optional()?;
    Ok(found.is_some())
}

/// Removes responses and suggestions attached to the assignments selected by
/// `assignment_filter` (a SQL predicate over `teachers_assigned`), then the
/// assignments themselves. Callers run this inside a transaction.
pub fn delete_assignments_where(
    conn: &Connection,
    assignment_filter: &str,
    id: &str,
) -> anyhow::Result<usize> {
    let ids_sql = format!("SELECT id FROM teachers_assigned WHERE {}", assignment_filter);
    conn.execute(
        &format!("DELETE FROM responses WHERE assignment_id IN ({})", ids_sql),
        [id],
    )
    .context("failed to delete responses")?;
    conn.execute(
        &format!("DELETE FROM suggestions WHERE assignment_id IN ({})", ids_sql),
        [id],
    )
    .context("failed to delete suggestions")?;
    let removed = conn
        .execute(
            &format!("DELETE FROM teachers_assigned WHERE {}", assignment_filter),
            [id],
        )
        .context("failed to delete assignments")?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_seeds_options_and_inactive_status() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        // Re-running is harmless.
        init_schema(&conn).expect("schema again");

        let values: Vec<i64> = conn
            .prepare("SELECT value FROM options ORDER BY value")
            .expect("prepare")
            .query_map([], |r| r.get(0))
            .expect("query")
            .collect::<Result<_, _>>()
            .expect("collect");
        assert_eq!(values, vec![1, 2, 3, 4, 5]);
        assert!(!survey_is_active(&conn).expect("status"));
    }

    #[test]
    fn bootstrap_admin_is_created_once() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        assert!(ensure_bootstrap_admin(&conn, "admin", "secret").expect("first"));
        assert!(!ensure_bootstrap_admin(&conn, "other", "secret").expect("second"));
        let admins: i64 = conn
            .query_row("SELECT COUNT(*) FROM users WHERE role = 'ADMIN'", [], |r| {
                r.get(0)
            })
            .expect("count");
        assert_eq!(admins, 1);
    }

    #[test]
    fn survey_toggle_round_trip_restores_flag() {
        let conn = Connection::open_in_memory().expect("open");
        init_schema(&conn).expect("schema");
        set_survey_active(&conn, true).expect("activate");
        set_survey_active(&conn, false).expect("deactivate");
        set_survey_active(&conn, true).expect("activate again");
        assert!(survey_is_active(&conn).expect("status"));
    }
}
