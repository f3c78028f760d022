use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use daylog_core::util::is_http_url;
use thiserror::Error;

const MIN_JWT_SECRET_LEN: usize = 16;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: String,
    pub jwt_secret: String,
    pub jwt_ttl: Duration,
    pub cors_allowed_origins: Vec<String>,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("db_path", &self.db_path)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_ttl", &self.jwt_ttl)
            .field("cors_allowed_origins", &self.cors_allowed_origins)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "DAYLOG_API_BIND_ADDR", "127.0.0.1:3000");
        let db_path = value_or_default(&lookup, "DAYLOG_API_DB_PATH", "daylog-api.db");

        let jwt_secret = required_trimmed(&lookup, "JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters"
            )));
        }

        let jwt_ttl_secs = value_or_default(&lookup, "JWT_TTL_SECS", "3600")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "JWT_TTL_SECS must be an integer in [60, 2592000]".to_string(),
                )
            })?;
        if !(60..=2_592_000).contains(&jwt_ttl_secs) {
            return Err(ConfigError::Invalid(
                "JWT_TTL_SECS must be in [60, 2592000]".to_string(),
            ));
        }

        let cors_allowed_origins = value_or_default(
            &lookup,
            "CORS_ALLOWED_ORIGINS",
            "http://localhost:5173,http://localhost:4000",
        )
        .split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect::<Vec<_>>();
        if let Some(origin) = cors_allowed_origins
            .iter()
            .find(|origin| !is_http_url(origin))
        {
            return Err(ConfigError::Invalid(format!(
                "CORS_ALLOWED_ORIGINS entry `{origin}` must start with http:// or https://"
            )));
        }

        Ok(Self {
            bind_addr,
            db_path,
            jwt_secret,
            jwt_ttl: Duration::from_secs(jwt_ttl_secs),
            cors_allowed_origins,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
