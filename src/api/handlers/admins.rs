use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use rusqlite::{Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{optional_text, required_text};
use crate::api::error::{created, ok, ApiError, ApiResult};
use crate::api::session::{session_token, AdminUser};
use crate::api::types::AppState;
use crate::auth::{self, Role};
use crate::db;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminBody {
    pub id_number: Option<String>,
    pub full_name: Option<String>,
    pub password: Option<String>,
}

fn admin_json(conn: &Connection, id: &str) -> Result<serde_json::Value, ApiError> {
    conn.query_row(
        "SELECT id, id_number, full_name, created_at FROM users WHERE id = ? AND role = ?",
        (id, Role::Admin.as_str()),
        |row| {
            let id: String = row.get(0)?;
            let id_number: String = row.get(1)?;
            let full_name: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(json!({
                "id": id,
                "idNumber": id_number,
                "fullName": full_name,
                "createdAt": created_at,
            }))
        },
    )
    .optional()?
    .ok_or_else(|| ApiError::not_found("admin"))
}

pub async fn list(State(state): State<AppState>, _admin: AdminUser) -> ApiResult {
    let conn = state.conn()?;
    let mut stmt = conn.prepare(
        "SELECT id, id_number, full_name, created_at FROM users
         WHERE role = ?
         ORDER BY full_name COLLATE NOCASE, id_number",
    )?;
    let admins = stmt
        .query_map([Role::Admin.as_str()], |row| {
            let id: String = row.get(0)?;
            let id_number: String = row.get(1)?;
            let full_name: String = row.get(2)?;
            let created_at: String = row.get(3)?;
            Ok(json!({
                "id": id,
                "idNumber": id_number,
                "fullName": full_name,
                "createdAt": created_at,
            }))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ok(json!({ "admins": admins })))
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<AdminBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let id_number = required_text(body.id_number, "idNumber")?;
    let full_name = required_text(body.full_name, "fullName")?;
    let password = body
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_params("missing password"))?;

    let conn = state.conn()?;
    let id = db::new_id();
    conn.execute(
        "INSERT INTO users(id, id_number, full_name, password_hash, role, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &id,
            &id_number,
            &full_name,
            auth::hash_password(&password)?,
            Role::Admin.as_str(),
            db::now_rfc3339(),
        ),
    )?;

    info!(id_number = %id_number, "created admin account");
    Ok(created(admin_json(&conn, &id)?))
}

/// A new password ends the account's other sessions, keeping the caller's
/// own when an admin edits themselves.
pub async fn update(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<AdminBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let id_number = optional_text(body.id_number, "idNumber")?;
    let full_name = optional_text(body.full_name, "fullName")?;
    let password = body.password.filter(|p| !p.is_empty());

    let mut conn = state.conn()?;
    admin_json(&conn, &id)?;

    let tx = conn.transaction()?;
    if let Some(id_number) = &id_number {
        tx.execute(
            "UPDATE users SET id_number = ? WHERE id = ?",
            (id_number, &id),
        )?;
    }
    if let Some(full_name) = &full_name {
        tx.execute(
            "UPDATE users SET full_name = ? WHERE id = ?",
            (full_name, &id),
        )?;
    }
    let mut ended = 0;
    if let Some(password) = &password {
        auth::set_password(&tx, &id, password)?;
        let keep = if me.user_id == id {
            session_token(&headers).unwrap_or_default()
        } else {
            String::new()
        };
        ended = auth::delete_other_sessions(&tx, &id, &keep)?;
    }
    tx.commit()?;

    if password.is_some() {
        info!(user_id = %id, ended, by = %me.id_number, "changed admin password");
    }
    Ok(ok(admin_json(&conn, &id)?))
}

pub async fn delete(
    State(state): State<AppState>,
    AdminUser(me): AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    let mut conn = state.conn()?;
    admin_json(&conn, &id)?;

    if me.user_id == id {
        return Err(ApiError::conflict("cannot delete your own account"));
    }
    let admins: i64 = conn.query_row(
        "SELECT COUNT(*) FROM users WHERE role = ?",
        [Role::Admin.as_str()],
        |r| r.get(0),
    )?;
    if admins <= 1 {
        return Err(ApiError::conflict("cannot delete the last admin"));
    }

    let tx = conn.transaction()?;
    auth::delete_user_sessions(&tx, &id)?;
    tx.execute("DELETE FROM users WHERE id = ?", [&id])?;
    tx.commit()?;

    info!(user_id = %id, "deleted admin account");
    Ok(ok(json!({ "deleted": id })))
}
