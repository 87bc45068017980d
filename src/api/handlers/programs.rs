use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ensure_exists, optional_text, required_text};
use crate::api::error::{created, ok, ApiError, ApiResult};
use crate::api::session::AdminUser;
use crate::api::types::AppState;
use crate::db;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramBody {
    pub name: Option<String>,
}

pub async fn list(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let conn = state.conn()?;

    // Correlated subqueries avoid double-counting from joins.
    let mut stmt = conn.prepare(
        "SELECT
           p.id,
           p.name,
           (SELECT COUNT(*) FROM sections s WHERE s.program_id = p.id) AS section_count,
           (SELECT COUNT(*) FROM courses c WHERE c.program_id = p.id) AS course_count,
           (SELECT COUNT(*) FROM students st WHERE st.program_id = p.id) AS student_count
         FROM programs p
         ORDER BY p.name COLLATE NOCASE",
    )?;
    let programs = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let section_count: i64 = row.get(2)?;
            let course_count: i64 = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "name": name,
                "sectionCount": section_count,
                "courseCount": course_count,
                "studentCount": student_count,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ok(json!({ "programs": programs })))
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<ProgramBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let name = required_text(body.name, "name")?;

    let conn = state.conn()?;
    let id = db::new_id();
    conn.execute("INSERT INTO programs(id, name) VALUES(?, ?)", (&id, &name))?;

    Ok(created(json!({ "id": id, "name": name })))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<ProgramBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let conn = state.conn()?;
    ensure_exists(&conn, "programs", &id, "program")?;

    if let Some(name) = optional_text(body.name, "name")? {
        conn.execute("UPDATE programs SET name = ? WHERE id = ?", (&name, &id))?;
    }
    let name: String = conn.query_row("SELECT name FROM programs WHERE id = ?", [&id], |r| {
        r.get(0)
    })?;

    Ok(ok(json!({ "id": id, "name": name })))
}

/// Removes a program with its sections, courses, assignments and their
/// evaluations. Refused while students are still enrolled.
pub async fn delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    let mut conn = state.conn()?;
    ensure_exists(&conn, "programs", &id, "program")?;

    let students: i64 = conn.query_row(
        "SELECT COUNT(*) FROM students WHERE program_id = ?",
        [&id],
        |r| r.get(0),
    )?;
    if students > 0 {
        return Err(ApiError::conflict("program still has enrolled students")
            .with_details(json!({ "studentCount": students })));
    }

    let tx = conn.transaction()?;
    let assignments = db::delete_assignments_where(&tx, "program_id = ?", &id)?;
    tx.execute("DELETE FROM courses WHERE program_id = ?", [&id])?;
    tx.execute("DELETE FROM sections WHERE program_id = ?", [&id])?;
    tx.execute("DELETE FROM programs WHERE id = ?", [&id])?;
    tx.commit()?;

    info!(program_id = %id, assignments, "deleted program");
    Ok(ok(json!({ "deleted": id })))
}
