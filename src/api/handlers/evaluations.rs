use axum::extract::rejection::QueryRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use rusqlite::{params_from_iter, types::Value, Connection};
use serde_json::json;
use tracing::info;

use super::{ensure_exists, ListFilter};
use crate::api::error::{ok, ApiError, ApiResult};
use crate::api::session::AdminUser;
use crate::api::types::AppState;
use crate::calc::{self, TeacherSummary};
use crate::db;
use crate::report;

fn csv_response(file_name: &str, body: String) -> Response {
    (
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        body,
    )
        .into_response()
}

fn load_summary(conn: &Connection, teacher_id: &str) -> Result<TeacherSummary, ApiError> {
    calc::teacher_summary(conn, teacher_id)?.ok_or_else(|| ApiError::not_found("teacher"))
}

fn suggestion_texts(conn: &Connection, teacher_id: &str) -> Result<Vec<String>, ApiError> {
    let mut stmt = conn.prepare(
        "SELECT text FROM suggestions WHERE teacher_id = ? ORDER BY created_at, id",
    )?;
    let texts = stmt
        .query_map([teacher_id], |r| r.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(texts)
}

pub async fn list(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let conn = state.conn()?;
    let summaries = calc::all_teacher_summaries(&conn)?;
    Ok(ok(json!({ "summaries": summaries })))
}

pub async fn get(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(teacher_id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    let summary = load_summary(&conn, &teacher_id)?;
    Ok(ok(json!({ "summary": summary })))
}

/// Paginated document model for printing one teacher's report.
pub async fn report(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(teacher_id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    let summary = load_summary(&conn, &teacher_id)?;
    let suggestions = suggestion_texts(&conn, &teacher_id)?;
    let doc = report::render_teacher_report(&summary, &suggestions, &state.report_options());
    Ok(ok(json!({ "report": doc })))
}

pub async fn report_csv(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(teacher_id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    let summary = load_summary(&conn, &teacher_id)?;
    let file_name = format!("evaluation-{}.csv", summary.faculty_id);
    Ok(csv_response(
        &file_name,
        report::teacher_breakdown_csv(&summary),
    ))
}

pub async fn export_csv(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let conn = state.conn()?;
    let summaries = calc::all_teacher_summaries(&conn)?;
    Ok(csv_response(
        "evaluations.csv",
        report::summaries_csv(&summaries),
    ))
}

/// Clears every response and suggestion. Only allowed while the survey is
/// closed.
pub async fn delete_all(State(state): State<AppState>, AdminUser(admin): AdminUser) -> ApiResult {
    let mut conn = state.conn()?;
    if db::survey_is_active(&conn)? {
        return Err(ApiError::new(
            "survey_active",
            "close the survey before deleting evaluations",
        ));
    }

    let tx = conn.transaction()?;
    let responses = tx.execute("DELETE FROM responses", [])?;
    let suggestions = tx.execute("DELETE FROM suggestions", [])?;
    tx.commit()?;

    info!(
        responses,
        suggestions,
        by = %admin.id_number,
        "deleted all evaluations"
    );
    Ok(ok(json!({
        "deletedResponses": responses,
        "deletedSuggestions": suggestions,
    })))
}

pub async fn suggestions(
    State(state): State<AppState>,
    _admin: AdminUser,
    filter: Result<Query<ListFilter>, QueryRejection>,
) -> ApiResult {
    let Query(filter) = filter?;
    let conn = state.conn()?;

    let mut sql = String::from(
        "SELECT sg.id, sg.teacher_id, t.full_name, sg.assignment_id, c.code, sg.text, sg.created_at
         FROM suggestions sg
         JOIN teachers t ON t.id = sg.teacher_id
         LEFT JOIN teachers_assigned a ON a.id = sg.assignment_id
         LEFT JOIN courses c ON c.id = a.course_id
         WHERE 1 = 1",
    );
    let mut binds: Vec<Value> = Vec::new();
    if let Some(tid) = filter.teacher_id {
        ensure_exists(&conn, "teachers", &tid, "teacher")?;
        sql.push_str(" AND sg.teacher_id = ?");
        binds.push(Value::Text(tid));
    }
    sql.push_str(" ORDER BY t.full_name COLLATE NOCASE, sg.created_at, sg.id");

    let mut stmt = conn.prepare(&sql)?;
    let suggestions = stmt
        .query_map(params_from_iter(binds), |row| {
            let id: String = row.get(0)?;
            let teacher_id: String = row.get(1)?;
            let teacher_name: String = row.get(2)?;
            let assignment_id: String = row.get(3)?;
            let course_code: Option<String> = row.get(4)?;
            let text: String = row.get(5)?;
            let created_at: String = row.get(6)?;
            Ok(json!({
                "id": id,
                "teacherId": teacher_id,
                "teacherName": teacher_name,
                "assignmentId": assignment_id,
                "courseCode": course_code,
                "text": text,
                "createdAt": created_at,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ok(json!({ "suggestions": suggestions })))
}
