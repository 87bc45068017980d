use axum::extract::State;
use rusqlite::Connection;
use serde_json::json;

use crate::api::error::{ok, ApiResult};
use crate::api::session::AdminUser;
use crate::api::types::AppState;
use crate::db;

pub async fn health(State(state): State<AppState>) -> ApiResult {
    let conn = state.conn()?;
    let active = db::survey_is_active(&conn)?;
    Ok(ok(json!({
        "version": env!("CARGO_PKG_VERSION"),
        "surveyActive": active,
    })))
}

fn count(conn: &Connection, sql: &str) -> rusqlite::Result<i64> {
    conn.query_row(sql, [], |r| r.get(0))
}

/// Entity counts plus completion figures. A submission is one student's
/// answer set for one assignment; expected submissions pair every student
/// with every assignment of their program and section.
pub async fn dashboard(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let conn = state.conn()?;

    let expected = count(
        &conn,
        "SELECT COUNT(*) FROM students st
         JOIN teachers_assigned a ON a.program_id = st.program_id AND a.section_id = st.section_id",
    )?;
    let submitted = count(
        &conn,
        "SELECT COUNT(*) FROM (SELECT DISTINCT student_id, assignment_id FROM responses)",
    )?;
    let fully_completed = count(
        &conn,
        "SELECT COUNT(*) FROM students st
         WHERE EXISTS(SELECT 1 FROM teachers_assigned a
                      WHERE a.program_id = st.program_id AND a.section_id = st.section_id)
           AND NOT EXISTS(
             SELECT 1 FROM teachers_assigned a
             WHERE a.program_id = st.program_id AND a.section_id = st.section_id
               AND NOT EXISTS(SELECT 1 FROM responses r
                              WHERE r.assignment_id = a.id AND r.student_id = st.id))",
    )?;
    let completion_rate = if expected > 0 {
        submitted as f64 / expected as f64
    } else {
        0.0
    };

    Ok(ok(json!({
        "programs": count(&conn, "SELECT COUNT(*) FROM programs")?,
        "sections": count(&conn, "SELECT COUNT(*) FROM sections")?,
        "courses": count(&conn, "SELECT COUNT(*) FROM courses")?,
        "teachers": count(&conn, "SELECT COUNT(*) FROM teachers")?,
        "students": count(&conn, "SELECT COUNT(*) FROM students")?,
        "assignments": count(&conn, "SELECT COUNT(*) FROM teachers_assigned")?,
        "questions": count(&conn, "SELECT COUNT(*) FROM questions")?,
        "responses": count(&conn, "SELECT COUNT(*) FROM responses")?,
        "suggestions": count(&conn, "SELECT COUNT(*) FROM suggestions")?,
        "submissions": submitted,
        "expectedSubmissions": expected,
        "completionRate": completion_rate,
        "studentsCompleted": fully_completed,
        "surveyActive": db::survey_is_active(&conn)?,
    })))
}
