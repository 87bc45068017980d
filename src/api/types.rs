use rusqlite::Connection;
use std::sync::{Arc, Mutex, MutexGuard};

use super::error::ApiError;
use crate::config::Config;
use crate::db;
use crate::report::ReportOptions;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(conn: Connection, config: Config) -> Self {
        Self {
            db: Arc::new(Mutex::new(conn)),
            config: Arc::new(config),
        }
    }

    /// Opens (or creates) the database in the configured data directory and
    /// makes sure an admin account exists.
    pub fn open(config: Config) -> anyhow::Result<Self> {
        let conn = db::open_db(&config.data_dir)?;
        db::ensure_bootstrap_admin(&conn, &config.admin_id, &config.admin_password)?;
        Ok(Self::new(conn, config))
    }

    /// Locks the shared connection. Never hold the guard across an await.
    pub fn conn(&self) -> Result<MutexGuard<'_, Connection>, ApiError> {
        self.db
            .lock()
            .map_err(|_| ApiError::internal("database lock poisoned"))
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            rows_per_page: self.config.report_rows_per_page,
        }
    }
}
