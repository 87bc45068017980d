pub mod admins;
pub mod assignments;
pub mod auth;
pub mod backup_exchange;
pub mod core;
pub mod courses;
pub mod evaluations;
pub mod programs;
pub mod questions;
pub mod sections;
pub mod students;
pub mod survey;
pub mod teachers;

use rusqlite::Connection;
use serde::Deserialize;

use super::error::ApiError;
use crate::db;

/// Query-string filters shared by the list endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilter {
    pub program_id: Option<String>,
    pub section_id: Option<String>,
    pub teacher_id: Option<String>,
    pub category_id: Option<String>,
}

fn required_text(value: Option<String>, field: &str) -> Result<String, ApiError> {
    let Some(v) = value else {
        return Err(ApiError::bad_params(format!("missing {}", field)));
    };
    let v = v.trim().to_string();
    if v.is_empty() {
        return Err(ApiError::bad_params(format!("{} must not be empty", field)));
    }
    Ok(v)
}

/// For updates: absent keeps the old value, present must be non-empty.
fn optional_text(value: Option<String>, field: &str) -> Result<Option<String>, ApiError> {
    match value {
        None => Ok(None),
        Some(v) => required_text(Some(v), field).map(Some),
    }
}

fn ensure_exists(conn: &Connection, table: &str, id: &str, what: &str) -> Result<(), ApiError> {
    if db::exists(conn, table, id)? {
        Ok(())
    } else {
        Err(ApiError::not_found(what))
    }
}

fn section_program(conn: &Connection, section_id: &str) -> Result<Option<String>, ApiError> {
    use rusqlite::OptionalExtension;
    Ok(conn
        .query_row(
            "SELECT program_id FROM sections WHERE id = ?",
            [section_id],
            |r| r.get(0),
        )
        .optional()?)
}

/// Checks that `section_id` exists and belongs to `program_id`.
fn ensure_section_in_program(
    conn: &Connection,
    program_id: &str,
    section_id: &str,
) -> Result<(), ApiError> {
    ensure_exists(conn, "programs", program_id, "program")?;
    match section_program(conn, section_id)? {
        None => Err(ApiError::not_found("section")),
        Some(p) if p != program_id => Err(ApiError::bad_params(
            "section does not belong to program",
        )
        .with_details(serde_json::json!({
            "programId": program_id,
            "sectionId": section_id,
        }))),
        Some(_) => Ok(()),
    }
}
