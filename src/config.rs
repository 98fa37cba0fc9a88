use std::env;
use std::path::PathBuf;

use tracing::info;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub base_url: String,
    pub database_url: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub upload_dir: PathBuf,
    pub bind_addr: String,
    pub production: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                key: "JWT_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} characters long"),
            });
        }
        let base_url = var_or("BASE_URL", "http://localhost:8080");
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid { key: "BASE_URL", reason: "must be an http(s) URL".into() });
        }
        let production = env::var("APP_ENV").map(|v| v.eq_ignore_ascii_case("production")).unwrap_or(false);

        Ok(Self {
            jwt_secret,
            base_url: base_url.trim_end_matches('/').to_string(),
            database_url: non_empty("DATABASE_URL"),
            data_dir: non_empty("DATA_DIR").map(PathBuf::from),
            upload_dir: PathBuf::from(var_or("UPLOAD_DIR", "public")),
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8080"),
            production,
        })
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    non_empty(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}
