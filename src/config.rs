//! Process configuration, read once from the environment at startup.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Where uploaded media bytes live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaConfig {
    Fs {
        dir: PathBuf,
    },
    S3 {
        endpoint: String,
        bucket: String,
        region: String,
        access_key: Option<String>,
        secret_key: Option<String>,
    },
}

/// Per-action sliding-window limits, keyed by client IP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub post_limit: usize,
    pub post_window: Duration,
    pub comment_limit: usize,
    pub comment_window: Duration,
    pub login_limit: usize,
    pub login_window: Duration,
    pub media_limit: usize,
    pub media_window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            post_limit: 5,
            post_window: Duration::from_secs(300),
            comment_limit: 20,
            comment_window: Duration::from_secs(60),
            login_limit: 10,
            login_window: Duration::from_secs(300),
            media_limit: 10,
            media_window: Duration::from_secs(3600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub frontend_url: String,
    pub session_ttl: chrono::Duration,
    pub cookie_secure: bool,
    pub enable_hsts: bool,
    /// Names promoted to moderator when they log in.
    pub bootstrap_moderators: Vec<String>,
    pub media: MediaConfig,
    /// `None` when limiting is switched off.
    pub rate_limit: Option<RateLimitConfig>,
}

const MIN_SECRET_LEN: usize = 32;

fn flag(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Build from any key lookup; `from_env` passes `std::env::var`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |k: &str| lookup(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let jwt_secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET",
                reason: format!("must be at least {MIN_SECRET_LEN} characters"),
            });
        }

        let database_url = get("DATABASE_URL");
        if cfg!(feature = "postgres-store") && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let session_hours = match get("SESSION_TTL_HOURS") {
            None => 24,
            Some(v) => match v.parse::<i64>() {
                Ok(h) if h > 0 => h,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "SESSION_TTL_HOURS",
                        reason: format!("expected a positive number of hours, got {v:?}"),
                    })
                }
            },
        };

        let media = match get("S3_ENDPOINT") {
            Some(endpoint) => MediaConfig::S3 {
                endpoint,
                bucket: get("S3_BUCKET").unwrap_or_else(|| "eco-media".into()),
                region: get("S3_REGION").unwrap_or_else(|| "us-east-1".into()),
                access_key: get("S3_ACCESS_KEY"),
                secret_key: get("S3_SECRET_KEY"),
            },
            None => MediaConfig::Fs { dir: get("MEDIA_DIR").unwrap_or_else(|| "data/media".into()).into() },
        };

        let rate_limit = if get("RATE_LIMIT").map(|v| flag(&v)).unwrap_or(true) {
            let defaults = RateLimitConfig::default();
            let count = |k: &str, d: usize| get(k).and_then(|v| v.parse().ok()).unwrap_or(d);
            let secs = |k: &str, d: Duration| get(k).and_then(|v| v.parse().ok()).map(Duration::from_secs).unwrap_or(d);
            Some(RateLimitConfig {
                post_limit: count("RL_POST_LIMIT", defaults.post_limit),
                post_window: secs("RL_POST_WINDOW", defaults.post_window),
                comment_limit: count("RL_COMMENT_LIMIT", defaults.comment_limit),
                comment_window: secs("RL_COMMENT_WINDOW", defaults.comment_window),
                login_limit: count("RL_LOGIN_LIMIT", defaults.login_limit),
                login_window: secs("RL_LOGIN_WINDOW", defaults.login_window),
                media_limit: count("RL_MEDIA_LIMIT", defaults.media_limit),
                media_window: secs("RL_MEDIA_WINDOW", defaults.media_window),
            })
        } else {
            None
        };

        Ok(Self {
            jwt_secret,
            database_url,
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            frontend_url: get("FRONTEND_URL").unwrap_or_else(|| "http://localhost:5173".into()),
            session_ttl: chrono::Duration::hours(session_hours),
            cookie_secure: get("COOKIE_SECURE").map(|v| flag(&v)).unwrap_or(false),
            enable_hsts: get("ENABLE_HSTS").map(|v| flag(&v)).unwrap_or(false),
            bootstrap_moderators: get("BOOTSTRAP_MODERATORS")
                .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
                .unwrap_or_default(),
            media,
            rate_limit,
        })
    }
}
