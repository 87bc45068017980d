use anyhow::{anyhow, Context};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use uuid::Uuid;

use crate::db;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Student,
    Admin,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "STUDENT",
            Role::Admin => "ADMIN",
        }
    }

    pub fn parse(raw: &str) -> Option<Role> {
        match raw {
            "STUDENT" => Some(Role::Student),
            "ADMIN" => Some(Role::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser {
    pub user_id: String,
    pub id_number: String,
    pub full_name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

/// Argon2id with default parameters, stored as a PHC string.
pub fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("failed to hash password: {e}"))?;
    Ok(hash.to_string())
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub user_id: String,
    pub password_hash: String,
    pub role: Role,
}

pub fn find_credentials(conn: &Connection, id_number: &str) -> anyhow::Result<Option<Credentials>> {
    let row = conn
        .query_row(
            "SELECT id, password_hash, role FROM users WHERE id_number = ?",
            [id_number],
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            },
        )
        .optional()?;
    let Some((user_id, password_hash, role)) = row else {
        return Ok(None);
    };
    let role = Role::parse(&role).with_context(|| format!("unknown role {role}"))?;
    Ok(Some(Credentials {
        user_id,
        password_hash,
        role,
    }))
}

pub fn create_session(conn: &Connection, user_id: &str, ttl_hours: i64) -> anyhow::Result<String> {
    let token = format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    let expires_at = chrono::Utc::now()
        .timestamp()
        .saturating_add(ttl_hours.saturating_mul(3600));
    conn.execute(
        "INSERT INTO sessions(token, user_id, created_at, expires_at) VALUES(?, ?, ?, ?)",
        (&token, user_id, db::now_rfc3339(), expires_at),
    )
    .context("failed to create session")?;
    Ok(token)
}

pub fn session_user(conn: &Connection, token: &str) -> anyhow::Result<Option<SessionUser>> {
    let now = chrono::Utc::now().timestamp();
    let row = conn
        .query_row(
            "SELECT u.id, u.id_number, u.full_name, u.role, st.id
             FROM sessions s
             JOIN users u ON u.id = s.user_id
             LEFT JOIN students st ON st.user_id = u.id
             WHERE s.token = ? AND s.expires_at > ?",
            (token, now),
            |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<String>>(4)?,
                ))
            },
        )
        .optional()?;
    let Some((user_id, id_number, full_name, role, student_id)) = row else {
        return Ok(None);
    };
    let Some(role) = Role::parse(&role) else {
        return Ok(None);
    };
    Ok(Some(SessionUser {
        user_id,
        id_number,
        full_name,
        role,
        student_id,
    }))
}

pub fn delete_session(conn: &Connection, token: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?", [token])?;
    Ok(())
}

pub fn delete_user_sessions(conn: &Connection, user_id: &str) -> anyhow::Result<usize> {
    Ok(conn.execute("DELETE FROM sessions WHERE user_id = ?", [user_id])?)
}

/// Ends every session of `user_id` except `keep`.
pub fn delete_other_sessions(conn: &Connection, user_id: &str, keep: &str) -> anyhow::Result<usize> {
    Ok(conn.execute(
        "DELETE FROM sessions WHERE user_id = ? AND token <> ?",
        (user_id, keep),
    )?)
}

pub fn purge_expired_sessions(conn: &Connection) -> anyhow::Result<usize> {
    let now = chrono::Utc::now().timestamp();
    Ok(conn.execute("DELETE FROM sessions WHERE expires_at <= ?", [now])?)
}

pub fn set_password(conn: &Connection, user_id: &str, password: &str) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET password_hash = ? WHERE id = ?",
        (hash_password(password)?, user_id),
    )?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_original_password() {
        let stored = hash_password("correct horse").expect("hash");
        assert!(stored.starts_with("$argon2id$"));
        assert!(verify_password(&stored, "correct horse"));
        assert!(!verify_password(&stored, "correct horse "));
        assert!(!verify_password(&stored, ""));
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same").expect("hash");
        let b = hash_password("same").expect("hash");
        assert_ne!(a, b);
        assert!(verify_password(&a, "same"));
        assert!(verify_password(&b, "same"));
    }

    #[test]
    fn malformed_hashes_never_verify() {
        assert!(!verify_password("", "x"));
        assert!(!verify_password("plain-text", "plain-text"));
        assert!(!verify_password("md5$salt$abc", "x"));
        assert!(!verify_password("$argon2id$v=19$truncated", "x"));
    }

    #[test]
    fn expired_sessions_are_not_resolved() {
        let conn = Connection::open_in_memory().expect("open");
        db::init_schema(&conn).expect("schema");
        db::ensure_bootstrap_admin(&conn, "admin", "pw").expect("admin");
        let creds = find_credentials(&conn, "admin")
            .expect("lookup")
            .expect("admin exists");

        let live = create_session(&conn, &creds.user_id, 1).expect("session");
        let stale = create_session(&conn, &creds.user_id, -1).expect("session");

        let user = session_user(&conn, &live).expect("query").expect("live");
        assert_eq!(user.role, Role::Admin);
        assert!(user.student_id.is_none());
        assert!(session_user(&conn, &stale).expect("query").is_none());

        assert_eq!(purge_expired_sessions(&conn).expect("purge"), 1);
        delete_session(&conn, &live).expect("logout");
        assert!(session_user(&conn, &live).expect("query").is_none());
    }
}
