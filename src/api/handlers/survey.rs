use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::info;

use super::questions::options_json;
use crate::api::error::{ok, ApiError, ApiResult};
use crate::api::session::{AdminUser, CurrentUser, StudentUser};
use crate::api::types::AppState;
use crate::db;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBody {
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    pub option_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBody {
    pub assignment_id: Option<String>,
    #[serde(default)]
    pub answers: Vec<Answer>,
    pub suggestion: Option<String>,
}

fn status_json(conn: &Connection) -> Result<serde_json::Value, ApiError> {
    let (active, updated_at): (i64, String) = conn.query_row(
        "SELECT is_active, updated_at FROM survey_status WHERE id = 1",
        [],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;
    Ok(json!({ "isActive": active != 0, "updatedAt": updated_at }))
}

/// Readable by any logged-in user.
pub async fn status(State(state): State<AppState>, _user: CurrentUser) -> ApiResult {
    let conn = state.conn()?;
    Ok(ok(status_json(&conn)?))
}

pub async fn toggle_status(State(state): State<AppState>, AdminUser(admin): AdminUser) -> ApiResult {
    let conn = state.conn()?;
    let active = !db::survey_is_active(&conn)?;
    db::set_survey_active(&conn, active)?;
    info!(active, by = %admin.id_number, "survey status toggled");
    Ok(ok(status_json(&conn)?))
}

pub async fn set_status(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<StatusBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let active = body
        .is_active
        .ok_or_else(|| ApiError::bad_params("missing isActive"))?;
    let conn = state.conn()?;
    db::set_survey_active(&conn, active)?;
    info!(active, by = %admin.id_number, "survey status set");
    Ok(ok(status_json(&conn)?))
}

/// Categories with their questions, plus the option scale, for rendering the
/// questionnaire.
pub async fn form(State(state): State<AppState>, _student: StudentUser) -> ApiResult {
    let conn = state.conn()?;

    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, q.id, q.text
         FROM categories c
         JOIN questions q ON q.category_id = c.id
         ORDER BY c.sort_order, c.name COLLATE NOCASE, q.sort_order, q.text",
    )?;
    let rows = stmt
        .query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, String>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut categories: Vec<serde_json::Value> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for (cid, cname, qid, qtext) in rows {
        let at = *index.entry(cid.clone()).or_insert_with(|| {
            categories.push(json!({ "id": cid, "name": cname, "questions": [] }));
            categories.len() - 1
        });
        if let Some(list) = categories[at]["questions"].as_array_mut() {
            list.push(json!({ "id": qid, "text": qtext }));
        }
    }

    Ok(ok(json!({
        "categories": categories,
        "options": options_json(&conn)?,
    })))
}

/// The student's assignments (teachers of their program and section) and
/// whether each one is already evaluated.
pub async fn assessments(State(state): State<AppState>, student: StudentUser) -> ApiResult {
    let conn = state.conn()?;

    let mut stmt = conn.prepare(
        "SELECT a.id, t.id, t.full_name, c.id, c.code, c.name, s.name, p.name,
           EXISTS(SELECT 1 FROM responses r
                  WHERE r.assignment_id = a.id AND r.student_id = st.id) AS completed
         FROM students st
         JOIN teachers_assigned a ON a.program_id = st.program_id AND a.section_id = st.section_id
         JOIN teachers t ON t.id = a.teacher_id
         JOIN courses c ON c.id = a.course_id
         JOIN sections s ON s.id = a.section_id
         JOIN programs p ON p.id = a.program_id
         WHERE st.id = ?
         ORDER BY c.code COLLATE NOCASE, t.full_name COLLATE NOCASE",
    )?;
    let assessments = stmt
        .query_map([&student.student_id], |row| {
            let assignment_id: String = row.get(0)?;
            let teacher_id: String = row.get(1)?;
            let teacher_name: String = row.get(2)?;
            let course_id: String = row.get(3)?;
            let course_code: String = row.get(4)?;
            let course_name: String = row.get(5)?;
            let section_name: String = row.get(6)?;
            let program_name: String = row.get(7)?;
            let completed: bool = row.get(8)?;
            Ok(json!({
                "assignmentId": assignment_id,
                "teacherId": teacher_id,
                "teacherName": teacher_name,
                "courseId": course_id,
                "courseCode": course_code,
                "courseName": course_name,
                "sectionName": section_name,
                "programName": program_name,
                "completed": completed,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let done = assessments
        .iter()
        .filter(|a| a["completed"].as_bool().unwrap_or(false))
        .count();
    Ok(ok(json!({
        "assessments": assessments,
        "completedCount": done,
        "pendingCount": assessments.len() - done,
    })))
}

/// Checks the answer set covers every question exactly once with existing
/// options. Returns the validated (question, option) pairs.
fn validate_answers(
    conn: &Connection,
    answers: &[Answer],
) -> Result<Vec<(String, String)>, ApiError> {
    let questions: HashSet<String> = conn
        .prepare("SELECT id FROM questions")?
        .query_map([], |r| r.get(0))?
        .collect::<Result<_, _>>()?;
    let options: HashSet<String> = conn
        .prepare("SELECT id FROM options")?
        .query_map([], |r| r.get(0))?
        .collect::<Result<_, _>>()?;

    if questions.is_empty() {
        return Err(ApiError::conflict("the questionnaire has no questions"));
    }

    let mut seen: HashSet<&str> = HashSet::new();
    let mut out = Vec::with_capacity(answers.len());
    for a in answers {
        if !questions.contains(&a.question_id) {
            return Err(ApiError::bad_params("unknown question")
                .with_details(json!({ "questionId": a.question_id })));
        }
        if !options.contains(&a.option_id) {
            return Err(ApiError::bad_params("unknown option")
                .with_details(json!({ "questionId": a.question_id, "optionId": a.option_id })));
        }
        if !seen.insert(a.question_id.as_str()) {
            return Err(ApiError::bad_params("question answered twice")
                .with_details(json!({ "questionId": a.question_id })));
        }
        out.push((a.question_id.clone(), a.option_id.clone()));
    }

    let mut missing: Vec<&String> = questions
        .iter()
        .filter(|q| !seen.contains(q.as_str()))
        .collect();
    if !missing.is_empty() {
        missing.sort();
        return Err(ApiError::bad_params("every question must be answered")
            .with_details(json!({ "missingQuestionIds": missing })));
    }
    Ok(out)
}

/// Stores one assessment: all answers and the optional suggestion commit in
/// a single transaction.
pub async fn submit(
    State(state): State<AppState>,
    student: StudentUser,
    payload: Result<Json<SubmitBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let assignment_id = body
        .assignment_id
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_params("missing assignmentId"))?;

    let mut conn = state.conn()?;
    if !db::survey_is_active(&conn)? {
        return Err(ApiError::new(
            "survey_inactive",
            "the evaluation survey is closed",
        ));
    }

    let target: Option<(String, bool)> = conn
        .query_row(
            "SELECT a.teacher_id,
               (a.program_id = st.program_id AND a.section_id = st.section_id)
             FROM teachers_assigned a, students st
             WHERE a.id = ? AND st.id = ?",
            (&assignment_id, &student.student_id),
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?;
    let Some((teacher_id, in_scope)) = target else {
        return Err(ApiError::not_found("assignment"));
    };
    if !in_scope {
        return Err(ApiError::forbidden(
            "assignment is not part of your program and section",
        ));
    }

    let already: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM responses WHERE student_id = ? AND assignment_id = ? LIMIT 1",
            (&student.student_id, &assignment_id),
            |r| r.get(0),
        )
        .optional()?;
    if already.is_some() {
        return Err(ApiError::new(
            "already_submitted",
            "you already evaluated this assignment",
        ));
    }

    let answers = validate_answers(&conn, &body.answers)?;
    let suggestion = body
        .suggestion
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let now = db::now_rfc3339();
    let tx = conn.transaction()?;
    for (question_id, option_id) in &answers {
        tx.execute(
            "INSERT INTO responses(id, student_id, teacher_id, question_id, option_id, assignment_id, created_at)
             VALUES(?, ?, ?, ?, ?, ?, ?)",
            (
                db::new_id(),
                &student.student_id,
                &teacher_id,
                question_id,
                option_id,
                &assignment_id,
                &now,
            ),
        )?;
    }
    if let Some(text) = &suggestion {
        tx.execute(
            "INSERT INTO suggestions(id, student_id, teacher_id, assignment_id, text, created_at)
             VALUES(?, ?, ?, ?, ?, ?)",
            (
                db::new_id(),
                &student.student_id,
                &teacher_id,
                &assignment_id,
                text,
                &now,
            ),
        )?;
    }
    tx.commit()?;

    info!(
        student = %student.user.id_number,
        assignment_id = %assignment_id,
        answers = answers.len(),
        "evaluation submitted"
    );
    Ok(ok(json!({
        "assignmentId": assignment_id,
        "responseCount": answers.len(),
        "suggestionSaved": suggestion.is_some(),
    })))
}
