use crate::error::{AppError, Result};

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lookback window bounds for the analysis endpoints (inclusive).
pub const MIN_PERIOD_DAYS: i64 = 1;
pub const MAX_PERIOD_DAYS: i64 = 365;
pub const DEFAULT_PERIOD_DAYS: i64 = 30;

/// Market history paging.
pub const DEFAULT_HISTORY_LIMIT: i64 = 30;
pub const MAX_HISTORY_LIMIT: i64 = 100;

/// Admin listing paging.
pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 500;

/// Cache warmer interval (seconds).
pub const CACHE_WARM_INTERVAL_SECS: u64 = 3_600;

/// How many past days of live results the cache keeps before the warmer evicts them.
pub const CACHE_RETENTION_DAYS: i64 = 2;

/// Timeout for the external result source.
pub const SYNC_HTTP_TIMEOUT_SECS: u64 = 30;

/// Consecutive failed logins before a user account is locked.
pub const MAX_LOGIN_ATTEMPTS: i64 = 5;
pub const ACCOUNT_LOCK_MINUTES: i64 = 15;

/// PBKDF2-HMAC-SHA256 iterations for new password hashes. Existing hashes
/// carry their own count in the PHC string.
#[cfg(not(test))]
pub const PASSWORD_HASH_ROUNDS: u32 = 600_000;
#[cfg(test)]
pub const PASSWORD_HASH_ROUNDS: u32 = 1_000;

pub const DEFAULT_JWT_SECRET: &str = "change_me";
pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub log_level: String,
    /// Signing key for bearer tokens (JWT_SECRET)
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    /// Seeded into the admins table when it is empty.
    pub admin_username: String,
    pub admin_password: String,
    /// URL returning a JSON array of results to import. Empty disables the sync job.
    pub sync_source: Option<String>,
    /// Local hour (0-23) at which the daily sync runs.
    pub sync_hour: u32,
    /// Allowed CORS origins; `*` allows any.
    pub cors_origins: Vec<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let sync_hour = std::env::var("SYNC_HOUR")
            .unwrap_or_else(|_| "21".to_string())
            .parse::<u32>()
            .map_err(|_| AppError::Config("SYNC_HOUR must be an hour between 0 and 23".to_string()))?;
        if sync_hour > 23 {
            return Err(AppError::Config("SYNC_HOUR must be an hour between 0 and 23".to_string()));
        }

        Ok(Self {
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("APP_PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("APP_PORT must be a valid port number".to_string()))?,
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "results.db".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            jwt_secret: std::env::var("JWT_SECRET").unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string()),
            access_token_minutes: std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
                .unwrap_or_else(|_| "30".to_string())
                .parse::<i64>()
                .map_err(|_| {
                    AppError::Config("ACCESS_TOKEN_EXPIRE_MINUTES must be an integer".to_string())
                })?,
            refresh_token_days: std::env::var("REFRESH_TOKEN_EXPIRE_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse::<i64>()
                .map_err(|_| {
                    AppError::Config("REFRESH_TOKEN_EXPIRE_DAYS must be an integer".to_string())
                })?,
            admin_username: std::env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string()),
            admin_password: std::env::var("ADMIN_PASSWORD")
                .unwrap_or_else(|_| DEFAULT_ADMIN_PASSWORD.to_string()),
            sync_source: std::env::var("EXTERNAL_SYNC_SOURCE")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            sync_hour,
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".to_string())
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
impl Config {
    /// Defaults with no environment lookups, for tests.
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            db_path: ":memory:".to_string(),
            log_level: "debug".to_string(),
            jwt_secret: "test-secret".to_string(),
            access_token_minutes: 30,
            refresh_token_days: 7,
            admin_username: "admin".to_string(),
            admin_password: "Admin123".to_string(),
            sync_source: None,
            sync_hour: 21,
            cors_origins: vec!["*".to_string()],
        }
    }
}
