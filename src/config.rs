use std::{str::FromStr, time::Duration};

use thiserror::Error;

use crate::retry::RetryPolicy;

pub const DEFAULT_GATEWAY_URL: &str = "https://ai.gateway.lovable.dev/v1/chat/completions";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not configured")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Model identifiers for each kind of gateway call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSet {
    pub vision: String,
    pub text: String,
    pub image: String,
}

impl Default for ModelSet {
    fn default() -> Self {
        Self {
            vision: "google/gemini-2.5-flash".into(),
            text: "google/gemini-2.5-flash".into(),
            image: "google/gemini-2.5-flash-image".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub gateway_url: String,
    pub models: ModelSet,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub max_body_bytes: usize,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = var("AI_GATEWAY_API_KEY").ok_or(ConfigError::Missing("AI_GATEWAY_API_KEY"))?;
        let defaults = ModelSet::default();
        let models = ModelSet {
            vision: var("VISION_MODEL").unwrap_or(defaults.vision),
            text: var("TEXT_MODEL").unwrap_or(defaults.text),
            image: var("IMAGE_MODEL").unwrap_or(defaults.image),
        };

        let timeout_secs: u64 = parse(&var, "GATEWAY_TIMEOUT_SECS", 60)?;
        let max_attempts: u32 = parse(&var, "UPSTREAM_MAX_ATTEMPTS", 2)?;
        let backoff_ms: u64 = parse(&var, "UPSTREAM_BACKOFF_MS", 500)?;
        let max_body_mb: usize = parse(&var, "MAX_BODY_MB", 16)?;
        let port: u16 = parse(&var, "PORT", 8080)?;

        if timeout_secs == 0 {
            return Err(ConfigError::Invalid { name: "GATEWAY_TIMEOUT_SECS", value: "0".into() });
        }
        let max_body_bytes = max_body_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| ConfigError::Invalid { name: "MAX_BODY_MB", value: max_body_mb.to_string() })?;

        let initial_backoff = Duration::from_millis(backoff_ms);
        let retry_defaults = RetryPolicy::default();
        // the cap never sits below the first backoff
        let max_backoff = retry_defaults.max_backoff.max(initial_backoff);

        Ok(Self {
            api_key,
            gateway_url: var("AI_GATEWAY_URL").unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string()),
            models,
            timeout: Duration::from_secs(timeout_secs),
            retry: RetryPolicy {
                max_attempts: max_attempts.max(1),
                initial_backoff,
                max_backoff,
                ..retry_defaults
            },
            max_body_bytes,
            port,
        })
    }

    /// Key prefix that is safe to put in logs.
    pub fn masked_key(&self) -> String {
        let shown: String = self.api_key.chars().take(6).collect();
        format!("{shown}***")
    }
}

fn parse<T: FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match var(name) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => Ok(default),
    }
}
