use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use rusqlite::{params_from_iter, types::Value};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ensure_exists, ensure_section_in_program, optional_text, required_text, ListFilter};
use crate::api::error::{created, ok, ApiError, ApiResult};
use crate::api::session::AdminUser;
use crate::api::types::AppState;
use crate::db;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseBody {
    pub code: Option<String>,
    pub name: Option<String>,
    pub program_id: Option<String>,
    pub section_id: Option<String>,
}

fn course_json(conn: &rusqlite::Connection, id: &str) -> Result<serde_json::Value, ApiError> {
    Ok(conn.query_row(
        "SELECT c.id, c.code, c.name, c.program_id, p.name, c.section_id, s.name
         FROM courses c
         JOIN programs p ON p.id = c.program_id
         JOIN sections s ON s.id = c.section_id
         WHERE c.id = ?",
        [id],
        |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            let name: String = row.get(2)?;
            let program_id: String = row.get(3)?;
            let program_name: String = row.get(4)?;
            let section_id: String = row.get(5)?;
            let section_name: String = row.get(6)?;
            Ok(json!({
                "id": id,
                "code": code,
                "name": name,
                "programId": program_id,
                "programName": program_name,
                "sectionId": section_id,
                "sectionName": section_name,
            }))
        },
    )?)
}

pub async fn list(
    State(state): State<AppState>,
    _admin: AdminUser,
    filter: Result<Query<ListFilter>, QueryRejection>,
) -> ApiResult {
    let Query(filter) = filter?;
    let conn = state.conn()?;

    let mut sql = String::from(
        "SELECT c.id, c.code, c.name, c.program_id, p.name, c.section_id, s.name
         FROM courses c
         JOIN programs p ON p.id = c.program_id
         JOIN sections s ON s.id = c.section_id
         WHERE 1 = 1",
    );
    let mut binds: Vec<Value> = Vec::new();
    if let Some(pid) = filter.program_id {
        sql.push_str(" AND c.program_id = ?");
        binds.push(Value::Text(pid));
    }
    if let Some(sid) = filter.section_id {
        sql.push_str(" AND c.section_id = ?");
        binds.push(Value::Text(sid));
    }
    sql.push_str(" ORDER BY c.code COLLATE NOCASE, s.name COLLATE NOCASE");

    let mut stmt = conn.prepare(&sql)?;
    let courses = stmt
        .query_map(params_from_iter(binds), |row| {
            let id: String = row.get(0)?;
            let code: String = row.get(1)?;
            let name: String = row.get(2)?;
            let program_id: String = row.get(3)?;
            let program_name: String = row.get(4)?;
            let section_id: String = row.get(5)?;
            let section_name: String = row.get(6)?;
            Ok(json!({
                "id": id,
                "code": code,
                "name": name,
                "programId": program_id,
                "programName": program_name,
                "sectionId": section_id,
                "sectionName": section_name,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ok(json!({ "courses": courses })))
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<CourseBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let code = required_text(body.code, "code")?;
    let name = required_text(body.name, "name")?;
    let program_id = required_text(body.program_id, "programId")?;
    let section_id = required_text(body.section_id, "sectionId")?;

    let conn = state.conn()?;
    ensure_section_in_program(&conn, &program_id, &section_id)?;
    let id = db::new_id();
    conn.execute(
        "INSERT INTO courses(id, program_id, section_id, code, name) VALUES(?, ?, ?, ?, ?)",
        (&id, &program_id, &section_id, &code, &name),
    )?;

    Ok(created(course_json(&conn, &id)?))
}

/// Code and name only; the teaching context of a course is fixed because
/// assignments and responses hang off it.
pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<CourseBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let mut conn = state.conn()?;
    ensure_exists(&conn, "courses", &id, "course")?;

    if body.program_id.is_some() || body.section_id.is_some() {
        return Err(ApiError::bad_params(
            "programId and sectionId cannot be changed",
        ));
    }
    let code = optional_text(body.code, "code")?;
    let name = optional_text(body.name, "name")?;

    let tx = conn.transaction()?;
    if let Some(code) = &code {
        tx.execute("UPDATE courses SET code = ? WHERE id = ?", (code, &id))?;
    }
    if let Some(name) = &name {
        tx.execute("UPDATE courses SET name = ? WHERE id = ?", (name, &id))?;
    }
    tx.commit()?;

    Ok(ok(course_json(&conn, &id)?))
}

pub async fn delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    let mut conn = state.conn()?;
    ensure_exists(&conn, "courses", &id, "course")?;

    let tx = conn.transaction()?;
    let assignments = db::delete_assignments_where(&tx, "course_id = ?", &id)?;
    tx.execute("DELETE FROM courses WHERE id = ?", [&id])?;
    tx.commit()?;

    info!(course_id = %id, assignments, "deleted course");
    Ok(ok(json!({ "deleted": id })))
}
