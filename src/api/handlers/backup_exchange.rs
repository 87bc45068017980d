use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::required_text;
use crate::api::error::{ok, ApiError, ApiResult};
use crate::api::session::AdminUser;
use crate::api::types::AppState;
use crate::{backup, db};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportBody {
    pub out_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBody {
    pub in_path: Option<String>,
}

fn resolve(data_dir: &Path, name: &str, field: &str) -> Result<PathBuf, ApiError> {
    backup::bundle_path(data_dir, name).ok_or_else(|| {
        warn!(field, name, "rejected backup path outside the backup directory");
        ApiError::bad_params(format!(
            "{} must be a relative path inside the {} directory",
            field,
            backup::BACKUP_DIR
        ))
        .with_details(json!({ field: name }))
    })
}

/// `outPath` names a file below `<data_dir>/backups`.
pub async fn export(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<ExportBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let name = required_text(body.out_path, "outPath")?;
    let out_path = resolve(&state.config.data_dir, &name, "outPath")?;

    let conn = state.conn()?;
    let summary = backup::export_bundle(&conn, &out_path)?;

    info!(
        path = %out_path.to_string_lossy(),
        by = %admin.id_number,
        "exported backup bundle"
    );
    Ok(ok(json!({
        "outPath": name,
        "bundleFormat": summary.bundle_format,
        "entryCount": summary.entry_count,
        "dbSha256": summary.db_sha256,
    })))
}

/// Replaces the live database with the bundle's snapshot. The shared
/// connection is swapped while the lock is held, so no request sees a
/// half-restored state. Every session in the old database is gone afterwards,
/// except those the bundle carried.
pub async fn import(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    payload: Result<Json<ImportBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let name = required_text(body.in_path, "inPath")?;
    let in_path = resolve(&state.config.data_dir, &name, "inPath")?;

    let mut conn = state.conn()?;
    let summary = backup::import_bundle(&in_path, &state.config.data_dir)?;
    *conn = db::open_db(&state.config.data_dir)?;
    db::ensure_bootstrap_admin(&conn, &state.config.admin_id, &state.config.admin_password)?;

    info!(
        path = %in_path.to_string_lossy(),
        by = %admin.id_number,
        "imported backup bundle"
    );
    Ok(ok(json!({
        "inPath": name,
        "bundleFormatDetected": summary.bundle_format_detected,
        "dbSha256": summary.db_sha256,
    })))
}
