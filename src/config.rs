//! Client configuration parsed from environment variables.
//!
//! Every service has its own base URL; defaults match a local development
//! stack (auth on 8081, forum on 8080, chat on 8082).

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_AUTH_URL: &str = "http://localhost:8081/api/v1/auth";
pub const DEFAULT_FORUM_URL: &str = "http://localhost:8080/api/v1";
pub const DEFAULT_CHAT_URL: &str = "http://localhost:8082/api/v1";
pub const DEFAULT_CHAT_WS_URL: &str = "ws://localhost:8082/ws";
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 1_000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 30_000;
pub const DEFAULT_OUTBOUND_QUEUE_LIMIT: usize = 256;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_SESSION_FILE: &str = ".forum-session.json";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value}")]
    InvalidNumber { var: &'static str, value: String },
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

/// Base URLs for the three backend services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub auth: String,
    pub forum: String,
    pub chat: String,
    pub chat_ws: String,
}

impl Endpoints {
    /// REST endpoint serving chat history.
    #[must_use]
    pub fn history_url(&self) -> String {
        format!("{}/messages", self.chat)
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            auth: DEFAULT_AUTH_URL.to_owned(),
            forum: DEFAULT_FORUM_URL.to_owned(),
            chat: DEFAULT_CHAT_URL.to_owned(),
            chat_ws: DEFAULT_CHAT_WS_URL.to_owned(),
        }
    }
}

/// Reconnect and queueing knobs for a chat session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub reconnect_base: Duration,
    pub reconnect_max: Duration,
    pub queue_limit: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            reconnect_base: Duration::from_millis(DEFAULT_RECONNECT_BASE_MS),
            reconnect_max: Duration::from_millis(DEFAULT_RECONNECT_MAX_MS),
            queue_limit: DEFAULT_OUTBOUND_QUEUE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub endpoints: Endpoints,
    pub session: SessionSettings,
    pub http_timeout: Duration,
    pub session_file: PathBuf,
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `FORUM_AUTH_URL`, `FORUM_API_URL`, `FORUM_CHAT_URL`, `FORUM_CHAT_WS_URL`
    /// - `FORUM_RECONNECT_BASE_MS`: default 1000
    /// - `FORUM_RECONNECT_MAX_MS`: default 30000
    /// - `FORUM_OUTBOUND_QUEUE_LIMIT`: default 256
    /// - `FORUM_HTTP_TIMEOUT_SECS`: default 15
    /// - `FORUM_SESSION_FILE`: default `.forum-session.json`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a numeric variable does not parse or is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoints = Endpoints {
            auth: env_url("FORUM_AUTH_URL", DEFAULT_AUTH_URL),
            forum: env_url("FORUM_API_URL", DEFAULT_FORUM_URL),
            chat: env_url("FORUM_CHAT_URL", DEFAULT_CHAT_URL),
            chat_ws: env_url("FORUM_CHAT_WS_URL", DEFAULT_CHAT_WS_URL),
        };

        let base_ms = env_parse("FORUM_RECONNECT_BASE_MS", DEFAULT_RECONNECT_BASE_MS)?;
        let max_ms = env_parse("FORUM_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS)?;
        let queue_limit = env_parse("FORUM_OUTBOUND_QUEUE_LIMIT", DEFAULT_OUTBOUND_QUEUE_LIMIT)?;
        let timeout_secs = env_parse("FORUM_HTTP_TIMEOUT_SECS", DEFAULT_HTTP_TIMEOUT_SECS)?;

        if base_ms == 0 {
            return Err(ConfigError::Zero { var: "FORUM_RECONNECT_BASE_MS" });
        }
        if queue_limit == 0 {
            return Err(ConfigError::Zero { var: "FORUM_OUTBOUND_QUEUE_LIMIT" });
        }
        // A zero reqwest timeout fails every request immediately.
        if timeout_secs == 0 {
            return Err(ConfigError::Zero { var: "FORUM_HTTP_TIMEOUT_SECS" });
        }

        let session = SessionSettings {
            reconnect_base: Duration::from_millis(base_ms),
            // Ceiling never drops below the base delay.
            reconnect_max: Duration::from_millis(max_ms.max(base_ms)),
            queue_limit,
        };

        let session_file = std::env::var("FORUM_SESSION_FILE")
            .ok()
            .filter(|s| !s.is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_SESSION_FILE), PathBuf::from);

        Ok(Self { endpoints, session, http_timeout: Duration::from_secs(timeout_secs), session_file })
    }
}

fn env_url(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_owned())
        .trim()
        .trim_end_matches('/')
        .to_owned()
}

fn env_parse<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { var: key, value: raw }),
        _ => Ok(default),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
