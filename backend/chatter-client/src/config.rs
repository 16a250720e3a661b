/// Configuration management for the chatter client
///
/// Everything is read from environment variables with sensible defaults, so
/// a bare `chatter-feed` talks to a local API on port 4000 and polls once a
/// minute.
use std::time::Duration;
use thiserror::Error;

use crate::engine::ReconcilePolicy;

const DEFAULT_BASE_URL: &str = "http://localhost:4000";
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PENDING_TTL_SECS: u64 = 120;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidNumber { var: &'static str, value: String },

    #[error("{var} must not be empty")]
    Empty { var: &'static str },

    #[error("unknown reconcile policy {0:?} (expected full-replace or preserve-pending)")]
    UnknownPolicy(String),

    #[error("unknown log format {0:?} (expected text or json)")]
    UnknownLogFormat(String),
}

/// Main client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote API settings
    pub api: ApiConfig,
    /// Feed engine settings
    pub feed: FeedConfig,
    /// Session to log in with at startup, if any
    pub session: Option<SessionConfig>,
    pub log_format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Origin of the contents API, without trailing slash
    pub base_url: String,
    /// Upper bound for a single request
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub refresh_interval: Duration,
    pub reconcile_policy: ReconcilePolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            },
            feed: FeedConfig {
                refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
                reconcile_policy: ReconcilePolicy::FullReplace,
            },
            session: None,
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("CHATTER_API_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();
        if base_url.is_empty() {
            return Err(ConfigError::Empty {
                var: "CHATTER_API_BASE_URL",
            });
        }

        let refresh_interval =
            secs_from_env("CHATTER_REFRESH_INTERVAL_SECS", DEFAULT_REFRESH_INTERVAL_SECS)?;
        let request_timeout =
            secs_from_env("CHATTER_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let pending_ttl = secs_from_env("CHATTER_PENDING_TTL_SECS", DEFAULT_PENDING_TTL_SECS)?;

        let reconcile_policy = match std::env::var("CHATTER_RECONCILE_POLICY")
            .unwrap_or_else(|_| "full-replace".to_string())
            .trim()
        {
            "full-replace" => ReconcilePolicy::FullReplace,
            "preserve-pending" => ReconcilePolicy::PreservePending { ttl: pending_ttl },
            other => return Err(ConfigError::UnknownPolicy(other.to_string())),
        };

        let session = match (
            std::env::var("CHATTER_USER_ID").ok(),
            std::env::var("CHATTER_USERNAME").ok(),
        ) {
            (Some(user_id), Some(username))
                if !user_id.trim().is_empty() && !username.trim().is_empty() =>
            {
                Some(SessionConfig { user_id, username })
            }
            _ => None,
        };

        let log_format = match std::env::var("CHATTER_LOG_FORMAT")
            .unwrap_or_else(|_| "text".to_string())
            .trim()
        {
            "text" => LogFormat::Text,
            "json" => LogFormat::Json,
            other => return Err(ConfigError::UnknownLogFormat(other.to_string())),
        };

        Ok(Config {
            api: ApiConfig {
                base_url,
                request_timeout,
            },
            feed: FeedConfig {
                refresh_interval,
                reconcile_policy,
            },
            session,
            log_format,
        })
    }
}

fn secs_from_env(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let raw = match std::env::var(var) {
        Ok(raw) => raw,
        Err(_) => return Ok(Duration::from_secs(default)),
    };

    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidNumber { var, value: raw }),
    }
}
