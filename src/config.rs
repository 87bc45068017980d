use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

pub const DB_FILE_NAME: &str = "sast.sqlite3";

/// Upper bound for `SAST_SESSION_TTL_HOURS`, one year.
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub admin_id: String,
    pub admin_password: String,
    pub session_ttl_hours: i64,
    pub cookie_secure: bool,
    pub report_rows_per_page: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("./data"),
            admin_id: "admin".to_string(),
            admin_password: "admin".to_string(),
            session_ttl_hours: 12,
            cookie_secure: false,
            report_rows_per_page: 20,
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let defaults = Self::default();
        Self {
            bind: try_load("SAST_BIND", defaults.bind),
            port: try_load("SAST_PORT", defaults.port),
            data_dir: PathBuf::from(try_load(
                "SAST_DATA_DIR",
                defaults.data_dir.to_string_lossy().to_string(),
            )),
            admin_id: try_load("SAST_ADMIN_ID", defaults.admin_id),
            admin_password: try_load("SAST_ADMIN_PASSWORD", defaults.admin_password),
            session_ttl_hours: capped_ttl(positive_or_default(
                "SAST_SESSION_TTL_HOURS",
                try_load("SAST_SESSION_TTL_HOURS", defaults.session_ttl_hours),
                defaults.session_ttl_hours,
            )),
            cookie_secure: try_load("SAST_COOKIE_SECURE", defaults.cookie_secure),
            report_rows_per_page: positive_or_default(
                "SAST_REPORT_ROWS_PER_PAGE",
                try_load("SAST_REPORT_ROWS_PER_PAGE", defaults.report_rows_per_page),
                defaults.report_rows_per_page,
            ),
        }
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => parse_or_default(key, &raw, default),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

fn parse_or_default<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
        default
    })
}

fn positive_or_default<T>(key: &str, value: T, default: T) -> T
where
    T: PartialOrd + Default + Display,
{
    if value > T::default() {
        value
    } else {
        warn!("{key} must be positive, using default: {default}");
        default
    }
}

fn capped_ttl(hours: i64) -> i64 {
    if hours > MAX_SESSION_TTL_HOURS {
        warn!("SAST_SESSION_TTL_HOURS capped at {MAX_SESSION_TTL_HOURS}");
        MAX_SESSION_TTL_HOURS
    } else {
        hours
    }
}

impl Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "listen={} data_dir={} session_ttl_hours={} cookie_secure={} report_rows_per_page={}",
            self.listen_addr(),
            self.data_dir.to_string_lossy(),
            self.session_ttl_hours,
            self.cookie_secure,
            self.report_rows_per_page
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_numbers_fall_back_to_default() {
        assert_eq!(parse_or_default::<u16>("SAST_PORT", "not-a-port", 8080), 8080);
        assert_eq!(parse_or_default::<u16>("SAST_PORT", " 9090 ", 8080), 9090);
    }

    #[test]
    fn non_positive_limits_are_rejected() {
        assert_eq!(positive_or_default("SAST_REPORT_ROWS_PER_PAGE", 0usize, 20), 20);
        assert_eq!(positive_or_default("SAST_SESSION_TTL_HOURS", -3i64, 12), 12);
        assert_eq!(positive_or_default("SAST_SESSION_TTL_HOURS", 4i64, 12), 4);
    }

    #[test]
    fn huge_session_ttl_is_capped() {
        assert_eq!(capped_ttl(i64::MAX), MAX_SESSION_TTL_HOURS);
        assert_eq!(capped_ttl(12), 12);
    }

    #[test]
    fn cookie_flag_parses_as_bool() {
        assert!(parse_or_default("SAST_COOKIE_SECURE", "true", false));
        assert!(!parse_or_default("SAST_COOKIE_SECURE", "yes", false));
        assert_eq!(Config::default().listen_addr(), "127.0.0.1:8080");
    }
}
