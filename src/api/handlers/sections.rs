use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use rusqlite::{params_from_iter, types::Value};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ensure_exists, optional_text, required_text, ListFilter};
use crate::api::error::{created, ok, ApiError, ApiResult};
use crate::api::session::AdminUser;
use crate::api::types::AppState;
use crate::db;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionBody {
    pub name: Option<String>,
    pub program_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    _admin: AdminUser,
    filter: Result<Query<ListFilter>, QueryRejection>,
) -> ApiResult {
    let Query(filter) = filter?;
    let conn = state.conn()?;

    let mut sql = String::from(
        "SELECT
           s.id,
           s.name,
           s.program_id,
           p.name,
           (SELECT COUNT(*) FROM students st WHERE st.section_id = s.id) AS student_count,
           (SELECT COUNT(*) FROM courses c WHERE c.section_id = s.id) AS course_count
         FROM sections s
         JOIN programs p ON p.id = s.program_id",
    );
    let mut binds: Vec<Value> = Vec::new();
    if let Some(pid) = filter.program_id {
        sql.push_str(" WHERE s.program_id = ?");
        binds.push(Value::Text(pid));
    }
    sql.push_str(" ORDER BY p.name COLLATE NOCASE, s.name COLLATE NOCASE");

    let mut stmt = conn.prepare(&sql)?;
    let sections = stmt
        .query_map(params_from_iter(binds), |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let program_id: String = row.get(2)?;
            let program_name: String = row.get(3)?;
            let student_count: i64 = row.get(4)?;
            let course_count: i64 = row.get(5)?;
            Ok(json!({
                "id": id,
                "name": name,
                "programId": program_id,
                "programName": program_name,
                "studentCount": student_count,
                "courseCount": course_count,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ok(json!({ "sections": sections })))
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<SectionBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let name = required_text(body.name, "name")?;
    let program_id = required_text(body.program_id, "programId")?;

    let conn = state.conn()?;
    ensure_exists(&conn, "programs", &program_id, "program")?;
    let id = db::new_id();
    conn.execute(
        "INSERT INTO sections(id, program_id, name) VALUES(?, ?, ?)",
        (&id, &program_id, &name),
    )?;

    Ok(created(json!({ "id": id, "name": name, "programId": program_id })))
}

/// Only the name can change; moving a section between programs would strand
/// its students and courses.
pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<SectionBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let conn = state.conn()?;
    ensure_exists(&conn, "sections", &id, "section")?;

    if body.program_id.is_some() {
        return Err(ApiError::bad_params("programId cannot be changed"));
    }
    if let Some(name) = optional_text(body.name, "name")? {
        conn.execute("UPDATE sections SET name = ? WHERE id = ?", (&name, &id))?;
    }
    let (name, program_id): (String, String) = conn.query_row(
        "SELECT name, program_id FROM sections WHERE id = ?",
        [&id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    Ok(ok(json!({ "id": id, "name": name, "programId": program_id })))
}

pub async fn delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    let mut conn = state.conn()?;
    ensure_exists(&conn, "sections", &id, "section")?;

    let students: i64 = conn.query_row(
        "SELECT COUNT(*) FROM students WHERE section_id = ?",
        [&id],
        |r| r.get(0),
    )?;
    if students > 0 {
        return Err(ApiError::conflict("section still has enrolled students")
            .with_details(json!({ "studentCount": students })));
    }

    let tx = conn.transaction()?;
    let assignments = db::delete_assignments_where(&tx, "section_id = ?", &id)?;
    tx.execute("DELETE FROM courses WHERE section_id = ?", [&id])?;
    tx.execute("DELETE FROM sections WHERE id = ?", [&id])?;
    tx.commit()?;

    info!(section_id = %id, assignments, "deleted section");
    Ok(ok(json!({ "deleted": id })))
}
