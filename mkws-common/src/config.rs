//! Configuration loading from the environment
//!
//! Required values (database DSN, platform token, secrets) fail fast at
//! startup; optional tuning values fall back to defaults and are
//! clamped into their valid ranges with a warning.

use crate::{Error, Result};
use tracing::warn;

/// Core configuration shared by the bot worker and the review API.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database path or sqlx URL.
    pub database_url: String,
    /// Chat-platform bot token (bot worker only).
    pub chat_token: String,
    /// OAuth application credentials for the review front-end login.
    pub oauth_client_id: String,
    pub oauth_client_secret: String,
    pub oauth_redirect_uri: String,
    /// Secret used to HMAC-sign browser session tokens.
    pub signing_secret: String,
    /// Shared key for bot -> API calls (`X-Api-Key` header).
    pub api_key: String,
    /// Allowed CORS origins for the review front-end.
    pub cors_origins: Vec<String>,
    /// Public base URL of the review front-end, used to build session links.
    pub public_web_url: String,
    /// Base URL of the review API, used by the bot's client.
    pub api_base_url: String,
    /// Listen port for the review API.
    pub api_port: u16,
    /// Connection pool ceiling.
    pub db_pool_max: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: required("MKWS_DATABASE_URL")?,
            chat_token: required("MKWS_CHAT_TOKEN")?,
            oauth_client_id: required("MKWS_OAUTH_CLIENT_ID")?,
            oauth_client_secret: required("MKWS_OAUTH_CLIENT_SECRET")?,
            oauth_redirect_uri: required("MKWS_OAUTH_REDIRECT_URI")?,
            signing_secret: required("MKWS_SIGNING_SECRET")?,
            api_key: required("MKWS_API_KEY")?,
            cors_origins: std::env::var("MKWS_CORS_ORIGINS")
                .unwrap_or_default()
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            public_web_url: required("MKWS_PUBLIC_WEB_URL")?,
            api_base_url: std::env::var("MKWS_API_BASE_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8720".to_string()),
            api_port: int_env("MKWS_API_PORT", 8720, 1, 65535) as u16,
            db_pool_max: int_env("MKWS_DB_POOL_MAX", 10, 1, 64) as u32,
        })
    }
}

fn required(key: &str) -> Result<String> {
    std::env::var(key)
        .map_err(|_| Error::Config(format!("{} is not set", key)))
        .and_then(|v| {
            if v.trim().is_empty() {
                Err(Error::Config(format!("{} is empty", key)))
            } else {
                Ok(v)
            }
        })
}

/// Parse an integer env var, clamping into `[min, max]`.
pub fn int_env(key: &str, default: i64, min: i64, max: i64) -> i64 {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<i64>() {
            Ok(v) if v < min || v > max => {
                warn!("{}={} outside [{}, {}], clamping", key, v, min, max);
                v.clamp(min, max)
            }
            Ok(v) => v,
            Err(_) => {
                warn!("{}={:?} is not an integer, using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a float env var, clamping into `[min, max]`.
pub fn float_env(key: &str, default: f64, min: f64, max: f64) -> f64 {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v < min || v > max => {
                warn!("{}={} outside [{}, {}], clamping", key, v, min, max);
                v.clamp(min, max)
            }
            Ok(v) => v,
            Err(_) => {
                warn!("{}={:?} is not a number, using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a boolean env var (`true`/`false`/`1`/`0`, case-insensitive).
pub fn bool_env(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        Err(_) => default,
    }
}
