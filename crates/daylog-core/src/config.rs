//! Client configuration read from the environment.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::util::{is_http_url, normalize_text_option};

pub const DEFAULT_API_URL: &str = "http://localhost:3000";
pub const DEFAULT_PUSH_DEBOUNCE_MS: u64 = 750;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_url: String,
    pub push_debounce: Duration,
    pub data_path: PathBuf,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = normalize_text_option(lookup("DAYLOG_API_URL"))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !is_http_url(&api_url) {
            return Err(ConfigError::Invalid(
                "DAYLOG_API_URL must start with http:// or https://".to_string(),
            ));
        }

        let debounce_ms = match normalize_text_option(lookup("DAYLOG_PUSH_DEBOUNCE_MS")) {
            Some(value) => value.parse::<u64>().map_err(|_| {
                ConfigError::Invalid(
                    "DAYLOG_PUSH_DEBOUNCE_MS must be an integer in [50, 10000]".to_string(),
                )
            })?,
            None => DEFAULT_PUSH_DEBOUNCE_MS,
        };
        if !(50..=10_000).contains(&debounce_ms) {
            return Err(ConfigError::Invalid(
                "DAYLOG_PUSH_DEBOUNCE_MS must be in [50, 10000]".to_string(),
            ));
        }

        let data_path = match normalize_text_option(lookup("DAYLOG_DATA_PATH")) {
            Some(path) => PathBuf::from(path),
            None => default_data_path()?,
        };

        Ok(Self {
            api_url,
            push_debounce: Duration::from_millis(debounce_ms),
            data_path,
        })
    }
}

/// `<platform data dir>/daylog/daylog.db`
pub fn default_data_path() -> Result<PathBuf, ConfigError> {
    dirs::data_dir()
        .map(|dir| dir.join("daylog").join("daylog.db"))
        .ok_or(ConfigError::MissingVar("DAYLOG_DATA_PATH"))
}
