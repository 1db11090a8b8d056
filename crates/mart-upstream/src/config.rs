use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    /// Largest accepted upload batch, in bytes.
    pub max_body_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "MART_UPSTREAM_BIND_ADDR", "0.0.0.0:9000");
        let db_path = PathBuf::from(value_or_default(
            &lookup,
            "MART_UPSTREAM_DB_PATH",
            "upstream.db",
        ));

        let max_body_mb = value_or_default(&lookup, "MART_UPSTREAM_MAX_BODY_MB", "32")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "MART_UPSTREAM_MAX_BODY_MB must be an integer in [1, 512]".to_string(),
                )
            })?;
        if !(1..=512).contains(&max_body_mb) {
            return Err(ConfigError::Invalid(
                "MART_UPSTREAM_MAX_BODY_MB must be in [1, 512]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            db_path,
            max_body_bytes: max_body_mb * 1024 * 1024,
        })
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
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
