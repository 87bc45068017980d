use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use rusqlite::{params_from_iter, types::Value, Connection, OptionalExtension};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ensure_section_in_program, optional_text, required_text, ListFilter};
use crate::api::error::{created, ok, ApiError, ApiResult};
use crate::api::session::AdminUser;
use crate::api::types::AppState;
use crate::auth::{self, Role};
use crate::db;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentBody {
    pub id_number: Option<String>,
    pub full_name: Option<String>,
    pub program_id: Option<String>,
    pub section_id: Option<String>,
    /// Defaults to the id number when creating.
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportBody {
    pub csv: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordBody {
    pub password: Option<String>,
}

const SELECT_STUDENTS: &str = "SELECT
       st.id, st.id_number, st.full_name,
       st.program_id, p.name, st.section_id, s.name,
       (SELECT COUNT(*) FROM teachers_assigned a
          WHERE a.program_id = st.program_id AND a.section_id = st.section_id) AS assigned,
       (SELECT COUNT(DISTINCT r.assignment_id) FROM responses r
          WHERE r.student_id = st.id) AS completed
     FROM students st
     JOIN programs p ON p.id = st.program_id
     JOIN sections s ON s.id = st.section_id";

fn student_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<serde_json::Value> {
    let id: String = row.get(0)?;
    let id_number: String = row.get(1)?;
    let full_name: String = row.get(2)?;
    let program_id: String = row.get(3)?;
    let program_name: String = row.get(4)?;
    let section_id: String = row.get(5)?;
    let section_name: String = row.get(6)?;
    let assigned: i64 = row.get(7)?;
    let completed: i64 = row.get(8)?;
    Ok(json!({
        "id": id,
        "idNumber": id_number,
        "fullName": full_name,
        "programId": program_id,
        "programName": program_name,
        "sectionId": section_id,
        "sectionName": section_name,
        "evaluationsAssigned": assigned,
        "evaluationsCompleted": completed,
    }))
}

fn student_json(conn: &Connection, id: &str) -> Result<serde_json::Value, ApiError> {
    conn.query_row(&format!("{} WHERE st.id = ?", SELECT_STUDENTS), [id], student_row)
        .optional()?
        .ok_or_else(|| ApiError::not_found("student"))
}

fn student_user_id(conn: &Connection, id: &str) -> Result<String, ApiError> {
    conn.query_row("SELECT user_id FROM students WHERE id = ?", [id], |r| {
        r.get(0)
    })
    .optional()?
    .ok_or_else(|| ApiError::not_found("student"))
}

fn insert_student(
    conn: &Connection,
    id_number: &str,
    full_name: &str,
    program_id: &str,
    section_id: &str,
    password: &str,
) -> Result<String, ApiError> {
    let user_id = db::new_id();
    conn.execute(
        "INSERT INTO users(id, id_number, full_name, password_hash, role, created_at)
         VALUES(?, ?, ?, ?, ?, ?)",
        (
            &user_id,
            id_number,
            full_name,
            auth::hash_password(password)?,
            Role::Student.as_str(),
            db::now_rfc3339(),
        ),
    )?;
    let id = db::new_id();
    conn.execute(
        "INSERT INTO students(id, user_id, id_number, full_name, program_id, section_id)
         VALUES(?, ?, ?, ?, ?, ?)",
        (&id, &user_id, id_number, full_name, program_id, section_id),
    )?;
    Ok(id)
}

pub async fn list(
    State(state): State<AppState>,
    _admin: AdminUser,
    filter: Result<Query<ListFilter>, QueryRejection>,
) -> ApiResult {
    let Query(filter) = filter?;
    let conn = state.conn()?;

    let mut sql = format!("{} WHERE 1 = 1", SELECT_STUDENTS);
    let mut binds: Vec<Value> = Vec::new();
    if let Some(pid) = filter.program_id {
        sql.push_str(" AND st.program_id = ?");
        binds.push(Value::Text(pid));
    }
    if let Some(sid) = filter.section_id {
        sql.push_str(" AND st.section_id = ?");
        binds.push(Value::Text(sid));
    }
    sql.push_str(" ORDER BY st.full_name COLLATE NOCASE, st.id_number");

    let mut stmt = conn.prepare(&sql)?;
    let students = stmt
        .query_map(params_from_iter(binds), student_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ok(json!({ "students": students })))
}

pub async fn create(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<StudentBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let id_number = required_text(body.id_number, "idNumber")?;
    let full_name = required_text(body.full_name, "fullName")?;
    let program_id = required_text(body.program_id, "programId")?;
    let section_id = required_text(body.section_id, "sectionId")?;
    let password = match body.password {
        Some(p) if !p.is_empty() => p,
        _ => id_number.clone(),
    };

    let mut conn = state.conn()?;
    ensure_section_in_program(&conn, &program_id, &section_id)?;

    let tx = conn.transaction()?;
    let id = insert_student(&tx, &id_number, &full_name, &program_id, &section_id, &password)?;
    tx.commit()?;

    Ok(created(student_json(&conn, &id)?))
}

pub async fn update(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<StudentBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let mut conn = state.conn()?;
    let user_id = student_user_id(&conn, &id)?;

    let id_number = optional_text(body.id_number, "idNumber")?;
    let full_name = optional_text(body.full_name, "fullName")?;
    let program_id = optional_text(body.program_id, "programId")?;
    let section_id = optional_text(body.section_id, "sectionId")?;

    // Program and section move together so the pair stays consistent.
    let placement = match (program_id, section_id) {
        (None, None) => None,
        (Some(p), Some(s)) => {
            ensure_section_in_program(&conn, &p, &s)?;
            Some((p, s))
        }
        _ => {
            return Err(ApiError::bad_params(
                "programId and sectionId must be changed together",
            ))
        }
    };

    let tx = conn.transaction()?;
    if let Some(id_number) = &id_number {
        tx.execute(
            "UPDATE students SET id_number = ? WHERE id = ?",
            (id_number, &id),
        )?;
        tx.execute(
            "UPDATE users SET id_number = ? WHERE id = ?",
            (id_number, &user_id),
        )?;
    }
    if let Some(full_name) = &full_name {
        tx.execute(
            "UPDATE students SET full_name = ? WHERE id = ?",
            (full_name, &id),
        )?;
        tx.execute(
            "UPDATE users SET full_name = ? WHERE id = ?",
            (full_name, &user_id),
        )?;
    }
    if let Some((program_id, section_id)) = &placement {
        tx.execute(
            "UPDATE students SET program_id = ?, section_id = ? WHERE id = ?",
            (program_id, section_id, &id),
        )?;
    }
    tx.commit()?;

    Ok(ok(student_json(&conn, &id)?))
}

/// Removes the student, their login, sessions and everything they submitted.
pub async fn delete(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult {
    let mut conn = state.conn()?;
    let user_id = student_user_id(&conn, &id)?;

    let tx = conn.transaction()?;
    let responses = tx.execute("DELETE FROM responses WHERE student_id = ?", [&id])?;
    tx.execute("DELETE FROM suggestions WHERE student_id = ?", [&id])?;
    tx.execute("DELETE FROM students WHERE id = ?", [&id])?;
    auth::delete_user_sessions(&tx, &user_id)?;
    tx.execute("DELETE FROM users WHERE id = ?", [&user_id])?;
    tx.commit()?;

    info!(student_id = %id, responses, "deleted student");
    Ok(ok(json!({ "deleted": id })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<String>,
    payload: Result<Json<PasswordBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let conn = state.conn()?;
    let user_id = student_user_id(&conn, &id)?;

    let password = match body.password {
        Some(p) if !p.is_empty() => p,
        _ => conn.query_row("SELECT id_number FROM students WHERE id = ?", [&id], |r| {
            r.get(0)
        })?,
    };
    auth::set_password(&conn, &user_id, &password)?;
    auth::delete_user_sessions(&conn, &user_id)?;

    Ok(ok(json!({ "studentId": id })))
}

pub fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf.trim().to_string());
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf.trim().to_string());
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    pub line: usize,
    pub id_number: String,
    pub full_name: String,
    pub program_name: String,
    pub section_name: String,
    pub password: Option<String>,
}

/// `idNumber,fullName,programName,sectionName[,password]`, optional header.
pub fn parse_import(csv: &str) -> Result<Vec<ImportRow>, ApiError> {
    let mut rows = Vec::new();
    for (idx, raw) in csv.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        let fields = parse_csv_record(raw);
        if line == 1
            && fields
                .first()
                .map(|f| f.eq_ignore_ascii_case("idNumber"))
                .unwrap_or(false)
        {
            continue;
        }
        if fields.len() < 4 || fields[..4].iter().any(|f| f.is_empty()) {
            return Err(ApiError::bad_params(
                "each row needs idNumber, fullName, programName and sectionName",
            )
            .with_details(json!({ "line": line })));
        }
        rows.push(ImportRow {
            line,
            id_number: fields[0].clone(),
            full_name: fields[1].clone(),
            program_name: fields[2].clone(),
            section_name: fields[3].clone(),
            password: fields.get(4).filter(|p| !p.is_empty()).cloned(),
        });
    }
    Ok(rows)
}

/// All-or-nothing bulk enrolment from CSV.
pub async fn import(
    State(state): State<AppState>,
    _admin: AdminUser,
    payload: Result<Json<ImportBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let csv = required_text(body.csv, "csv")?;
    let rows = parse_import(&csv)?;
    if rows.is_empty() {
        return Err(ApiError::bad_params("csv has no student rows"));
    }

    let mut conn = state.conn()?;
    let tx = conn.transaction()?;
    for row in &rows {
        let placement: Option<(String, String)> = tx
            .query_row(
                "SELECT p.id, s.id
                 FROM programs p
                 JOIN sections s ON s.program_id = p.id
                 WHERE p.name = ? AND s.name = ?",
                (&row.program_name, &row.section_name),
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?;
        let Some((program_id, section_id)) = placement else {
            return Err(ApiError::bad_params("unknown program/section").with_details(json!({
                "line": row.line,
                "programName": row.program_name,
                "sectionName": row.section_name,
            })));
        };
        let password = row.password.clone().unwrap_or_else(|| row.id_number.clone());
        insert_student(
            &tx,
            &row.id_number,
            &row.full_name,
            &program_id,
            &section_id,
            &password,
        )
        .map_err(|e| {
            let line = row.line;
            ApiError::new(e.code, e.message).with_details(json!({
                "line": line,
                "idNumber": row.id_number,
            }))
        })?;
    }
    tx.commit()?;

    info!(imported = rows.len(), "imported students");
    Ok(ok(json!({ "imported": rows.len() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_record_handles_quotes_and_commas() {
        assert_eq!(
            parse_csv_record("2024-001,\"Cruz, Juan\",BSCS,1A"),
            vec!["2024-001", "Cruz, Juan", "BSCS", "1A"]
        );
        assert_eq!(
            parse_csv_record("a,\"say \"\"hi\"\"\",c"),
            vec!["a", "say \"hi\"", "c"]
        );
    }

    #[test]
    fn import_skips_header_and_blank_lines() {
        let rows = parse_import(
            "idNumber,fullName,programName,sectionName,password\n\n2024-001,Ana,BSCS,1A\n2024-002,Ben,BSCS,1B,pw\n",
        )
        .expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].line, 3);
        assert_eq!(rows[0].password, None);
        assert_eq!(rows[1].password.as_deref(), Some("pw"));
    }

    #[test]
    fn import_rejects_short_rows_with_line_number() {
        let err = parse_import("2024-001,Ana,BSCS").expect_err("short row");
        assert_eq!(err.code, "bad_params");
        assert_eq!(err.details, Some(json!({ "line": 1 })));
    }
}
