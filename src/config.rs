//! Configuration loaded from the environment.
//!
//! `.env` is read first (if present), then each setting falls back to its
//! default when the variable is unset.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;
use crate::pending::DEFAULT_PENDING_TIMEOUT;

/// Top-level configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub turn: TurnConfig,
    pub log_format: LogFormat,
}

/// HTTP gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Accepted bearer tokens and the user each one authenticates.
    pub tokens: Vec<ApiToken>,
    pub event_buffer: usize,
    pub max_subscribers: u64,
}

/// A bearer token bound to a user id.
#[derive(Debug, Clone)]
pub struct ApiToken {
    pub token: SecretString,
    pub user_id: i64,
}

/// Turn engine settings.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Deadline for remote tool results and confirmations.
    pub pending_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let tokens = match get("GATEWAY_TOKENS") {
            Some(raw) => parse_tokens(&raw)?,
            None => Vec::new(),
        };

        let gateway = GatewayConfig {
            host: get("GATEWAY_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: parse_or("GATEWAY_PORT", get("GATEWAY_PORT"), 3000)?,
            tokens,
            event_buffer: parse_or("EVENT_BUFFER", get("EVENT_BUFFER"), 256)?,
            max_subscribers: parse_or("MAX_SUBSCRIBERS", get("MAX_SUBSCRIBERS"), 100)?,
        };

        let timeout_secs = parse_or(
            "PENDING_TIMEOUT_SECS",
            get("PENDING_TIMEOUT_SECS"),
            DEFAULT_PENDING_TIMEOUT.as_secs(),
        )?;
        if timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "PENDING_TIMEOUT_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        let log_format = match get("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "LOG_FORMAT".to_string(),
                    message: format!("expected 'pretty' or 'json', got '{}'", other),
                });
            }
        };

        Ok(Self {
            gateway,
            turn: TurnConfig {
                pending_timeout: Duration::from_secs(timeout_secs),
            },
            log_format,
        })
    }
}

impl GatewayConfig {
    /// Whether any token is configured.
    pub fn has_tokens(&self) -> bool {
        !self.tokens.is_empty()
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Parse `token:user_id,token:user_id`.
fn parse_tokens(raw: &str) -> Result<Vec<ApiToken>, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: "GATEWAY_TOKENS".to_string(),
        message,
    };

    let mut tokens = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        // Split on the last colon so tokens may contain colons.
        let (token, user) = entry
            .rsplit_once(':')
            .ok_or_else(|| invalid(format!("entry {} is not token:user_id", tokens.len() + 1)))?;
        if token.is_empty() {
            return Err(invalid(format!("entry {} has an empty token", tokens.len() + 1)));
        }
        let user_id = user
            .trim()
            .parse::<i64>()
            .map_err(|e| invalid(format!("entry {} has a bad user id: {}", tokens.len() + 1, e)))?;
        tokens.push(ApiToken {
            token: SecretString::from(token.to_string()),
            user_id,
        });
    }

    let mut seen = std::collections::HashSet::new();
    if tokens.iter().any(|t| !seen.insert(t.token.expose_secret().to_string())) {
        return Err(invalid("the same token is listed twice".to_string()));
    }
    Ok(tokens)
}
