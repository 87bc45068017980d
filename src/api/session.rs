use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};

use super::error::ApiError;
use super::types::AppState;
use crate::auth::{self, Role, SessionUser};

pub const SESSION_COOKIE: &str = "sast_session";

pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn session_cookie(token: &str, ttl_hours: i64, secure: bool) -> HeaderValue {
    let mut raw = format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl_hours.saturating_mul(3600)
    );
    if secure {
        raw.push_str("; Secure");
    }
    HeaderValue::from_str(&raw).unwrap_or_else(|_| HeaderValue::from_static("sast_session="))
}

pub fn clear_cookie() -> (axum::http::HeaderName, HeaderValue) {
    (
        SET_COOKIE,
        HeaderValue::from_static("sast_session=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0"),
    )
}

/// Any logged-in user.
pub struct CurrentUser(pub SessionUser);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let token = session_token(&parts.headers).ok_or_else(ApiError::unauthorized)?;
        let conn = state.conn()?;
        let user = auth::session_user(&conn, &token)?.ok_or_else(ApiError::unauthorized)?;
        Ok(CurrentUser(user))
    }
}

pub struct AdminUser(pub SessionUser);

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != Role::Admin {
            return Err(ApiError::forbidden("admin role required"));
        }
        Ok(AdminUser(user))
    }
}

/// A logged-in student, with the student record id resolved.
pub struct StudentUser {
    pub user: SessionUser,
    pub student_id: String,
}

#[async_trait]
impl FromRequestParts<AppState> for StudentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, ApiError> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if user.role != Role::Student {
            return Err(ApiError::forbidden("student role required"));
        }
        let student_id = user
            .student_id
            .clone()
            .ok_or_else(|| ApiError::forbidden("account has no student record"))?;
        Ok(StudentUser { user, student_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_read_among_other_cookies() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; sast_session=abc123; lang=en"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn empty_or_missing_cookie_yields_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);
        headers.insert(COOKIE, HeaderValue::from_static("sast_session="));
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn secure_attribute_follows_config() {
        let plain = session_cookie("tok", 2, false);
        assert_eq!(
            plain.to_str().expect("ascii"),
            "sast_session=tok; HttpOnly; Path=/; SameSite=Lax; Max-Age=7200"
        );
        let secure = session_cookie("tok", 2, true);
        assert!(secure.to_str().expect("ascii").ends_with("; Secure"));
    }
}
