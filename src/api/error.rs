use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn bad_params(message: impl Into<String>) -> Self {
        Self::new("bad_params", message)
    }

    pub fn not_found(what: &str) -> Self {
        Self::new("not_found", format!("{} not found", what))
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }

    pub fn unauthorized() -> Self {
        Self::new("unauthorized", "login required")
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.code {
            "bad_params" | "bad_json" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" | "survey_active" | "survey_inactive" | "already_submitted" => {
                StatusCode::CONFLICT
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code, message = %self.message, "request failed");
        }
        let mut body = json!({
            "code": self.code,
            "message": self.message,
        });
        if let Some(d) = self.details {
            body["details"] = d;
        }
        (status, Json(json!({ "ok": false, "error": body }))).into_response()
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref inner, ref msg) = e {
            if inner.code == rusqlite::ErrorCode::ConstraintViolation {
                return ApiError::conflict(
                    msg.clone()
                        .unwrap_or_else(|| "constraint violation".to_string()),
                );
            }
        }
        ApiError::new("db_query_failed", e.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        if let Some(sql) = e.downcast_ref::<rusqlite::Error>() {
            if let rusqlite::Error::SqliteFailure(inner, msg) = sql {
                if inner.code == rusqlite::ErrorCode::ConstraintViolation {
                    return ApiError::conflict(
                        msg.clone()
                            .unwrap_or_else(|| "constraint violation".to_string()),
                    );
                }
            }
        }
        ApiError::internal(format!("{e:#}"))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::new("bad_json", e.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::bad_params(e.body_text())
    }
}

pub type ApiResult<T = Response> = Result<T, ApiError>;

/// Success envelope: `{"ok": true, "result": ...}`.
pub fn ok(result: serde_json::Value) -> Response {
    Json(json!({ "ok": true, "result": result })).into_response()
}

pub fn created(result: serde_json::Value) -> Response {
    (
        StatusCode::CREATED,
        Json(json!({ "ok": true, "result": result })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_map_to_http_statuses() {
        assert_eq!(ApiError::bad_params("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("teacher").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::new("survey_inactive", "x").status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::new("db_query_failed", "x").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn unique_violations_become_conflicts() {
        let conn = rusqlite::Connection::open_in_memory().expect("open");
        conn.execute("CREATE TABLE t(name TEXT UNIQUE)", [])
            .expect("create");
        conn.execute("INSERT INTO t(name) VALUES('a')", [])
            .expect("insert");
        let e = conn
            .execute("INSERT INTO t(name) VALUES('a')", [])
            .expect_err("duplicate");
        assert_eq!(ApiError::from(e).code, "conflict");
    }
}
