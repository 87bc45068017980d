//! Survey content: categories, their questions, and the Likert options.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
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
pub struct CategoryBody {
    pub name: Option<String>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBody {
    pub text: Option<String>,
    pub category_id: Option<String>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionBody {
    pub text: Option<String>,
    pub value: Option<i64>,
}

fn next_sort_order(conn: &Connection, sql: &str, binds: Vec<Value>) -> Result<i64, ApiError> {
    let max: Option<i64> = conn.query_row(sql, params_from_iter(binds), |r| r.get(0))?;
    Ok(max.map(|m| m + 1).unwrap_or(0))
}

fn category_json(conn: &Connection, id: &str) -> Result<serde_json::Value, ApiError> {
    conn.query_row(
        "SELECT c.id, c.name, c.sort_order,
           (SELECT COUNT(*) FROM questions q WHERE q.category_id = c.id)
         FROM categories c WHERE c.id = ?",
        [id],
        |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let sort_order: i64 = row.get(2)?;
            let question_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "sortOrder": sort_order,
                "questionCount": question_count,
            }))
        },
    )
    .optional()?
    .ok_or_else(|| ApiError::not_found("category"))
}

pub async fn list_categories(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let conn = state.conn()?;
    let mut stmt = conn.prepare(
        "SELECT c.id, c.name, c.sort_order,
           (SELECT COUNT(*) FROM questions q WHERE q.category_id = c.id)
         FROM categories c
         ORDER BY c.sort_order, c.name COLLATE NOCASE",
    )?;
    let categories = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let name: String = row.get(1)?;
            let sort_order: i64 = row.get(2)?;
            let question_count: i64 = row.get(3)?;
            Ok(json!({
                "id": id,
                "name": name,
                "sortOrder": sort_order,
                "questionCount": question_count,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ok(json!({ "categories": categories })))
}

pub async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<CategoryBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let name = required_text(body.name, "name")?;

    let conn = state.conn()?;
    let sort_order = match body.sort_order {
        Some(v) => v,
        None => next_sort_order(&conn, "SELECT MAX(sort_order) FROM categories", Vec::new())?,
    };
    let id = db::new_id();
    conn.execute(
        "INSERT INTO categories(id, name, sort_order) VALUES(?, ?, ?)",
        (&id, &name, sort_order),
    )?;

    Ok(created(category_json(&conn, &id)?))
}

pub async fn update_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<CategoryBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let name = optional_text(body.name, "name")?;

    let mut conn = state.conn()?;
    ensure_exists(&conn, "categories", &id, "category")?;

    let tx = conn.transaction()?;
    if let Some(name) = &name {
        tx.execute("UPDATE categories SET name = ? WHERE id = ?", (name, &id))?;
    }
    if let Some(sort_order) = body.sort_order {
        tx.execute(
            "UPDATE categories SET sort_order = ? WHERE id = ?",
            (sort_order, &id),
        )?;
    }
    tx.commit()?;

    Ok(ok(category_json(&conn, &id)?))
}

/// Drops the category, its questions and every answer given to them.
pub async fn delete_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    let mut conn = state.conn()?;
    ensure_exists(&conn, "categories", &id, "category")?;

    let tx = conn.transaction()?;
    let responses = tx.execute(
        "DELETE FROM responses
         WHERE question_id IN (SELECT id FROM questions WHERE category_id = ?)",
        [&id],
    )?;
    tx.execute("DELETE FROM questions WHERE category_id = ?", [&id])?;
    tx.execute("DELETE FROM categories WHERE id = ?", [&id])?;
    tx.commit()?;

    info!(category_id = %id, responses, "deleted category");
    Ok(ok(json!({ "deleted": id })))
}

fn question_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let text: String = row.get(1)?;
    let sort_order: i64 = row.get(2)?;
    let category_id: String = row.get(3)?;
    let category_name: String = row.get(4)?;
    Ok(json!({
        "id": id,
        "text": text,
        "sortOrder": sort_order,
        "categoryId": category_id,
        "categoryName": category_name,
    }))
}

const SELECT_QUESTIONS: &str = "SELECT q.id, q.text, q.sort_order, q.category_id, c.name
     FROM questions q
     JOIN categories c ON c.id = q.category_id";

fn question_json(conn: &Connection, id: &str) -> Result<serde_json::Value, ApiError> {
    conn.query_row(
        &format!("{} WHERE q.id = ?", SELECT_QUESTIONS),
        [id],
        question_row,
    )
    .optional()?
    .ok_or_else(|| ApiError::not_found("question"))
}

pub async fn list_questions(
    State(state): State<AppState>,
    _admin: AdminUser,
    filter: Result<Query<ListFilter>, QueryRejection>,
) -> ApiResult {
    let Query(filter) = filter?;
    let conn = state.conn()?;

    let mut sql = SELECT_QUESTIONS.to_string();
    let mut binds: Vec<Value> = Vec::new();
    if let Some(cid) = filter.category_id {
        sql.push_str(" WHERE q.category_id = ?");
        binds.push(Value::Text(cid));
    }
    sql.push_str(" ORDER BY c.sort_order, c.name COLLATE NOCASE, q.sort_order, q.text");

    let mut stmt = conn.prepare(&sql)?;
    let questions = stmt
        .query_map(params_from_iter(binds), question_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ok(json!({ "questions": questions })))
}

pub async fn create_question(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<QuestionBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let text = required_text(body.text, "text")?;
    let category_id = required_text(body.category_id, "categoryId")?;

    let conn = state.conn()?;
    ensure_exists(&conn, "categories", &category_id, "category")?;
    let sort_order = match body.sort_order {
        Some(v) => v,
        None => next_sort_order(
            &conn,
            "SELECT MAX(sort_order) FROM questions WHERE category_id = ?",
            vec![Value::Text(category_id.clone())],
        )?,
    };
    let id = db::new_id();
    conn.execute(
        "INSERT INTO questions(id, category_id, text, sort_order) VALUES(?, ?, ?, ?)",
        (&id, &category_id, &text, sort_order),
    )?;

    Ok(created(question_json(&conn, &id)?))
}

pub async fn update_question(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<QuestionBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let text = optional_text(body.text, "text")?;
    let category_id = optional_text(body.category_id, "categoryId")?;

    let mut conn = state.conn()?;
    ensure_exists(&conn, "questions", &id, "question")?;
    if let Some(category_id) = &category_id {
        ensure_exists(&conn, "categories", category_id, "category")?;
    }

    let tx = conn.transaction()?;
    if let Some(text) = &text {
        tx.execute("UPDATE questions SET text = ? WHERE id = ?", (text, &id))?;
    }
    if let Some(category_id) = &category_id {
        tx.execute(
            "UPDATE questions SET category_id = ? WHERE id = ?",
            (category_id, &id),
        )?;
    }
    if let Some(sort_order) = body.sort_order {
        tx.execute(
            "UPDATE questions SET sort_order = ? WHERE id = ?",
            (sort_order, &id),
        )?;
    }
    tx.commit()?;

    Ok(ok(question_json(&conn, &id)?))
}

pub async fn delete_question(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    let mut conn = state.conn()?;
    ensure_exists(&conn, "questions", &id, "question")?;

    let tx = conn.transaction()?;
    let responses = tx.execute("DELETE FROM responses WHERE question_id = ?", [&id])?;
    tx.execute("DELETE FROM questions WHERE id = ?", [&id])?;
    tx.commit()?;

    info!(question_id = %id, responses, "deleted question");
    Ok(ok(json!({ "deleted": id })))
}

pub fn options_json(conn: &Connection) -> Result<Vec<serde_json::Value>, ApiError> {
    let mut stmt = conn.prepare("SELECT id, text, value FROM options ORDER BY value")?;
    let options = stmt
        .query_map([], |row| {
            let id: String = row.get(0)?;
            let text: String = row.get(1)?;
            let value: i64 = row.get(2)?;
            Ok(json!({ "id": id, "text": text, "value": value }))
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(options)
}

fn checked_value(value: i64) -> Result<i64, ApiError> {
    if (1..=5).contains(&value) {
        Ok(value)
    } else {
        Err(ApiError::bad_params("value must be between 1 and 5")
            .with_details(json!({ "value": value })))
    }
}

pub async fn list_options(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let conn = state.conn()?;
    Ok(ok(json!({ "options": options_json(&conn)? })))
}

pub async fn create_option(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<OptionBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let text = required_text(body.text, "text")?;
    let value = checked_value(
        body.value
            .ok_or_else(|| ApiError::bad_params("missing value"))?,
    )?;

    let conn = state.conn()?;
    let id = db::new_id();
    conn.execute(
        "INSERT INTO options(id, text, value) VALUES(?, ?, ?)",
        (&id, &text, value),
    )?;

    Ok(created(json!({ "id": id, "text": text, "value": value })))
}

pub async fn update_option(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<OptionBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let text = optional_text(body.text, "text")?;
    let value = body.value.map(checked_value).transpose()?;

    let mut conn = state.conn()?;
    ensure_exists(&conn, "options", &id, "option")?;

    let tx = conn.transaction()?;
    if let Some(text) = &text {
        tx.execute("UPDATE options SET text = ? WHERE id = ?", (text, &id))?;
    }
    if let Some(value) = value {
        tx.execute("UPDATE options SET value = ? WHERE id = ?", (value, &id))?;
    }
    tx.commit()?;
    let (text, value): (String, i64) = conn.query_row(
        "SELECT text, value FROM options WHERE id = ?",
        [&id],
        |r| Ok((r.get(0)?, r.get(1)?)),
    )?;

    Ok(ok(json!({ "id": id, "text": text, "value": value })))
}

/// Existing answers that chose this option stay and score 0 from now on.
pub async fn delete_option(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    let conn = state.conn()?;
    ensure_exists(&conn, "options", &id, "option")?;

    let orphaned: i64 = conn.query_row(
        "SELECT COUNT(*) FROM responses WHERE option_id = ?",
        [&id],
        |r| r.get(0),
    )?;
    conn.execute("DELETE FROM options WHERE id = ?", [&id])?;

    info!(option_id = %id, orphaned, "deleted option");
    Ok(ok(json!({ "deleted": id, "orphanedResponses": orphaned })))
}
