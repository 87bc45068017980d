use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ensure_exists, ensure_section_in_program, required_text, ListFilter};
use crate::api::error::{created, ok, ApiError, ApiResult};
use crate::api::session::AdminUser;
use crate::api::types::AppState;
use crate::db;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentBody {
    pub teacher_id: Option<String>,
    pub program_id: Option<String>,
    pub section_id: Option<String>,
    pub course_id: Option<String>,
}

struct Context {
    teacher_id: String,
    program_id: String,
    section_id: String,
    course_id: String,
}

const SELECT_ASSIGNMENTS: &str = "SELECT
       a.id, a.teacher_id, t.full_name, t.faculty_id,
       a.program_id, p.name, a.section_id, s.name,
       a.course_id, c.code, c.name,
       (SELECT COUNT(DISTINCT r.student_id) FROM responses r
          WHERE r.assignment_id = a.id) AS evaluations
     FROM teachers_assigned a
     JOIN teachers t ON t.id = a.teacher_id
     JOIN programs p ON p.id = a.program_id
     JOIN sections s ON s.id = a.section_id
     JOIN courses c ON c.id = a.course_id";

fn assignment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let teacher_id: String = row.get(1)?;
    let teacher_name: String = row.get(2)?;
    let faculty_id: String = row.get(3)?;
    let program_id: String = row.get(4)?;
    let program_name: String = row.get(5)?;
    let section_id: String = row.get(6)?;
    let section_name: String = row.get(7)?;
    let course_id: String = row.get(8)?;
    let course_code: String = row.get(9)?;
    let course_name: String = row.get(10)?;
    let evaluations: i64 = row.get(11)?;
    Ok(json!({
        "id": id,
        "teacherId": teacher_id,
        "teacherName": teacher_name,
        "facultyId": faculty_id,
        "programId": program_id,
        "programName": program_name,
        "sectionId": section_id,
        "sectionName": section_name,
        "courseId": course_id,
        "courseCode": course_code,
        "courseName": course_name,
        "evaluationCount": evaluations,
    }))
}

fn assignment_json(conn: &Connection, id: &str) -> Result<serde_json::Value, ApiError> {
    conn.query_row(
        &format!("{} WHERE a.id = ?", SELECT_ASSIGNMENTS),
        [id],
        assignment_row,
    )
    .optional()?
    .ok_or_else(|| ApiError::not_found("assignment"))
}

/// The course must be offered in the given program and section.
fn validate_context(conn: &Connection, ctx: &Context) -> Result<(), ApiError> {
    ensure_exists(conn, "teachers", &ctx.teacher_id, "teacher")?;
    ensure_section_in_program(conn, &ctx.program_id, &ctx.section_id)?;
    let placement: Option<(String, String)> = conn
        .query_row(
            "SELECT program_id, section_id FROM courses WHERE id = ?",
            [&ctx.course_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    match placement {
        None => Err(ApiError::not_found("course")),
        Some((p, s)) if p != ctx.program_id || s != ctx.section_id => Err(
            ApiError::bad_params("course is not offered in that program and section")
                .with_details(json!({
                    "courseId": ctx.course_id,
                    "programId": ctx.program_id,
                    "sectionId": ctx.section_id,
                })),
        ),
        Some(_) => Ok(()),
    }
}

pub async fn list(
    State(state): State<AppState>,
    _admin: AdminUser,
    filter: Result<Query<ListFilter>, QueryRejection>,
) -> ApiResult {
    let Query(filter) = filter?;
    let conn = state.conn()?;

    let mut sql = format!("{} WHERE 1 = 1", SELECT_ASSIGNMENTS);
    let mut binds: Vec<Value> = Vec::new();
    if let Some(tid) = filter.teacher_id {
        sql.push_str(" AND a.teacher_id = ?");
        binds.push(Value::Text(tid));
    }
    if let Some(pid) = filter.program_id {
        sql.push_str(" AND a.program_id = ?");
        binds.push(Value::Text(pid));
    }
    if let Some(sid) = filter.section_id {
        sql.push_str(" AND a.section_id = ?");
        binds.push(Value::Text(sid));
    }
    sql.push_str(" ORDER BY t.full_name COLLATE NOCASE, c.code COLLATE NOCASE, s.name COLLATE NOCASE");

    let mut stmt = conn.prepare(&sql)?;
    let assignments = stmt
        .query_map(params_from_iter(binds), assignment_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ok(json!({ "assignments": assignments })))
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<AssignmentBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let ctx = Context {
        teacher_id: required_text(body.teacher_id, "teacherId")?,
        program_id: required_text(body.program_id, "programId")?,
        section_id: required_text(body.section_id, "sectionId")?,
        course_id: required_text(body.course_id, "courseId")?,
    };

    let conn = state.conn()?;
    validate_context(&conn, &ctx)?;
    let id = db::new_id();
    conn.execute(
        "INSERT INTO teachers_assigned(id, teacher_id, program_id, section_id, course_id)
         VALUES(?, ?, ?, ?, ?)",
        (
            &id,
            &ctx.teacher_id,
            &ctx.program_id,
            &ctx.section_id,
            &ctx.course_id,
        ),
    )?;

    Ok(created(assignment_json(&conn, &id)?))
}

/// Re-targets an assignment. Refused once evaluations exist, since they were
/// given for the original teaching context.
pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<AssignmentBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let conn = state.conn()?;

    let current: Option<(String, String, String, String)> = conn
        .query_row(
            "SELECT teacher_id, program_id, section_id, course_id FROM teachers_assigned WHERE id = ?",
            [&id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((teacher_id, program_id, section_id, course_id)) = current else {
        return Err(ApiError::not_found("assignment"));
    };

    let responses: i64 = conn.query_row(
        "SELECT COUNT(*) FROM responses WHERE assignment_id = ?",
        [&id],
        |r| r.get(0),
    )?;
    if responses > 0 {
        return Err(ApiError::conflict("assignment already has evaluations")
            .with_details(json!({ "responseCount": responses })));
    }

    let ctx = Context {
        teacher_id: body.teacher_id.unwrap_or(teacher_id),
        program_id: body.program_id.unwrap_or(program_id),
        section_id: body.section_id.unwrap_or(section_id),
        course_id: body.course_id.unwrap_or(course_id),
    };
    validate_context(&conn, &ctx)?;
    conn.execute(
        "UPDATE teachers_assigned
         SET teacher_id = ?, program_id = ?, section_id = ?, course_id = ?
         WHERE id = ?",
        (
            &ctx.teacher_id,
            &ctx.program_id,
            &ctx.section_id,
            &ctx.course_id,
            &id,
        ),
    )?;

    Ok(ok(assignment_json(&conn, &id)?))
}

pub async fn delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    let mut conn = state.conn()?;
    ensure_exists(&conn, "teachers_assigned", &id, "assignment")?;

    let tx = conn.transaction()?;
    db::delete_assignments_where(&tx, "id = ?", &id)?;
    tx.commit()?;

    info!(assignment_id = %id, "deleted assignment");
    Ok(ok(json!({ "deleted": id })))
}
