use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ensure_exists, optional_text, required_text};
use crate::api::error::{created, ok, ApiResult};
use crate::api::session::AdminUser;
use crate::api::types::AppState;
use crate::db;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherBody {
    pub faculty_id: Option<String>,
    pub full_name: Option<String>,
}

pub async fn list(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let conn = state.conn()?;

    let mut stmt = conn.prepare(
        "SELECT
           t.id,
           t.faculty_id,
           t.full_name,
           (SELECT COUNT(*) FROM teachers_assigned a WHERE a.teacher_id = t.id) AS assignment_count,
           (SELECT COUNT(DISTINCT r.student_id || ':' || r.assignment_id)
              FROM responses r WHERE r.teacher_id = t.id) AS evaluation_count
         FROM teachers t
         ORDER BY t.full_name COLLATE NOCASE, t.faculty_id",
    )?;
    let teachers = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let faculty_id: String = row.get(1)?;
            let full_name: String = row.get(2)?;
            let assignment_count: i64 = row.get(3)?;
            let evaluation_count: i64 = row.get(4)?;
            Ok(json!({
                "id": id,
                "facultyId": faculty_id,
                "fullName": full_name,
                "assignmentCount": assignment_count,
                "evaluationCount": evaluation_count,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ok(json!({ "teachers": teachers })))
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<TeacherBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let faculty_id = required_text(body.faculty_id, "facultyId")?;
    let full_name = required_text(body.full_name, "fullName")?;

    let conn = state.conn()?;
    let id = db::new_id();
    conn.execute(
        "INSERT INTO teachers(id, faculty_id, full_name) VALUES(?, ?, ?)",
        (&id, &faculty_id, &full_name),
    )?;

    Ok(created(json!({
        "id": id,
        "facultyId": faculty_id,
        "fullName": full_name,
    })))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<TeacherBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let faculty_id = optional_text(body.faculty_id, "facultyId")?;
    let full_name = optional_text(body.full_name, "fullName")?;

    let mut conn = state.conn()?;
    ensure_exists(&conn, "teachers", &id, "teacher")?;

    let tx = conn.transaction()?;
    if let Some(faculty_id) = &faculty_id {
        tx.execute(
            "UPDATE teachers SET faculty_id = ? WHERE id = ?",
            (faculty_id, &id),
        )?;
    }
    if let Some(full_name) = &full_name {
        tx.execute(
            "UPDATE teachers SET full_name = ? WHERE id = ?",
            (full_name, &id),
        )?;
    }
    tx.commit()?;
    let (faculty_id, full_name): (String, String) = conn.query_row(
        "SELECT faculty_id, full_name FROM teachers WHERE id = ?",
        [&id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    Ok(ok(json!({
        "id": id,
        "facultyId": faculty_id,
        "fullName": full_name,
    })))
}

/// Deleting a teacher removes their assignments and every response and
/// suggestion about them.
pub async fn delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    let mut conn = state.conn()?;
    ensure_exists(&conn, "teachers", &id, "teacher")?;

    let tx = conn.transaction()?;
    // Rows pointing at the teacher directly, even if their assignment is gone.
    tx.execute("DELETE FROM responses WHERE teacher_id = ?", [&id])?;
    tx.execute("DELETE FROM suggestions WHERE teacher_id = ?", [&id])?;
    let assignments = db::delete_assignments_where(&tx, "teacher_id = ?", &id)?;
    tx.execute("DELETE FROM teachers WHERE id = ?", [&id])?;
    tx.commit()?;

    info!(teacher_id = %id, assignments, "deleted teacher");
    Ok(ok(json!({ "deleted": id })))
}
