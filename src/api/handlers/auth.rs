use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::required_text;
use crate::api::error::{ok, ApiError, ApiResult};
use crate::api::session::{clear_cookie, session_cookie, session_token, CurrentUser};
use crate::api::types::AppState;
use crate::auth;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginBody {
    pub id_number: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordBody {
    pub current_password: Option<String>,
    pub new_password: Option<String>,
}

fn invalid_credentials() -> ApiError {
    ApiError::new("unauthorized", "invalid id number or password")
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let id_number = required_text(body.id_number, "idNumber")?;
    let password = body
        .password
        .ok_or_else(|| ApiError::bad_params("missing password"))?;

    let conn = state.conn()?;
    auth::purge_expired_sessions(&conn)?;

    let Some(creds) = auth::find_credentials(&conn, &id_number)? else {
        warn!(id_number = %id_number, "login failed: unknown id number");
        return Err(invalid_credentials());
    };
    if !auth::verify_password(&creds.password_hash, &password) {
        warn!(id_number = %id_number, "login failed: wrong password");
        return Err(invalid_credentials());
    }

    let ttl = state.config.session_ttl_hours;
    let token = auth::create_session(&conn, &creds.user_id, ttl)?;
    let user = auth::session_user(&conn, &token)?
        .ok_or_else(|| ApiError::internal("session vanished after login"))?;

    info!(id_number = %id_number, role = creds.role.as_str(), "login");
    let mut resp = ok(json!({ "user": user }));
    resp.headers_mut()
        .insert(SET_COOKIE, session_cookie(&token, ttl, state.config.cookie_secure));
    Ok(resp)
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult {
    if let Some(token) = session_token(&headers) {
        let conn = state.conn()?;
        auth::delete_session(&conn, &token)?;
    }
    let mut resp = ok(json!({ "loggedOut": true }));
    let (name, value) = clear_cookie();
    resp.headers_mut().insert(name, value);
    Ok(resp)
}

pub async fn me(CurrentUser(user): CurrentUser) -> ApiResult {
    Ok(ok(json!({ "user": user })))
}

/// Changing the password ends every other session of the account.
pub async fn change_password(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
    payload: Result<Json<ChangePasswordBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let current = body
        .current_password
        .ok_or_else(|| ApiError::bad_params("missing currentPassword"))?;
    let new_password = body
        .new_password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ApiError::bad_params("missing newPassword"))?;

    let conn = state.conn()?;
    let creds = auth::find_credentials(&conn, &user.id_number)?
        .ok_or_else(ApiError::unauthorized)?;
    if !auth::verify_password(&creds.password_hash, &current) {
        return Err(ApiError::forbidden("current password is incorrect"));
    }
    auth::set_password(&conn, &user.user_id, &new_password)?;

    let keep = session_token(&headers).unwrap_or_default();
    auth::delete_other_sessions(&conn, &user.user_id, &keep)?;

    Ok(ok(json!({ "changed": true })))
}
