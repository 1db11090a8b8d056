use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use mart_core::util::{is_http_url, normalize_text_option};
use thiserror::Error;

use crate::cli::Cli;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Replica settings: environment first, then command-line overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarConfig {
    pub db_path: PathBuf,
    pub bind_addr: String,
    /// Absent means offline-only.
    pub upstream_url: Option<String>,
    pub branch_id: String,
    pub sync_interval: Duration,
    pub sync_timeout: Duration,
}

impl SidecarConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let db_path = PathBuf::from(value_or_default(&lookup, "POS_DB_PATH", "offline.db"));
        let bind_addr = value_or_default(&lookup, "POS_BIND_ADDR", "0.0.0.0:8080");
        let upstream_url = validate_upstream(optional_trimmed(&lookup, "POS_UPSTREAM_URL"))?;
        let branch_id = value_or_default(&lookup, "POS_BRANCH_ID", "local");
        let sync_interval = seconds_in_range(&lookup, "POS_SYNC_INTERVAL_SECS", 300, 5, 86_400)?;
        let sync_timeout = seconds_in_range(&lookup, "POS_SYNC_TIMEOUT_SECS", 30, 1, 600)?;

        Ok(Self {
            db_path,
            bind_addr,
            upstream_url,
            branch_id,
            sync_interval,
            sync_timeout,
        })
    }

    /// Apply the global command-line flags on top of the environment.
    pub fn with_cli(mut self, cli: &Cli) -> Result<Self, ConfigError> {
        if let Some(db_path) = &cli.db_path {
            self.db_path.clone_from(db_path);
        }
        if let Some(upstream) = validate_upstream(normalize_text_option(cli.upstream.clone()))? {
            self.upstream_url = Some(upstream);
        }
        if let Some(branch_id) = normalize_text_option(cli.branch_id.clone()) {
            self.branch_id = branch_id;
        }
        Ok(self)
    }
}

fn validate_upstream(url: Option<String>) -> Result<Option<String>, ConfigError> {
    match url {
        Some(url) if !is_http_url(&url) => Err(ConfigError::Invalid(
            "POS_UPSTREAM_URL must start with http:// or https://".to_string(),
        )),
        other => Ok(other.map(|url| url.trim_end_matches('/').to_string())),
    }
}

fn seconds_in_range(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<Duration, ConfigError> {
    let secs = match optional_trimmed(lookup, name) {
        Some(raw) => raw.parse::<u64>().map_err(|_| {
            ConfigError::Invalid(format!("{name} must be an integer in [{min}, {max}]"))
        })?,
        None => default,
    };
    if !(min..=max).contains(&secs) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{min}, {max}]"
        )));
    }
    Ok(Duration::from_secs(secs))
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    normalize_text_option(lookup(name))
}
