//! Resolved executor configuration.
//!
//! Raw deserialization structs (with `Option` fields) stay private; the
//! public [`ExecutorConfig`] is fully validated at construction. Existence of
//! a value is the proof of its validity.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Environment variable consulted by [`ExecutorConfig::from_env`].
pub const BASE_URL_ENV_VAR: &str = "PLUTUS_API_BASE_URL";

/// Default per-attempt timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default retry budget (up to `DEFAULT_MAX_RETRIES + 1` transport calls).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("base URL {url:?} is not a valid absolute http(s) URL")]
    InvalidBaseUrl { url: String },

    #[error("environment variable {0} is not set")]
    MissingBaseUrl(&'static str),

    #[error("timeout must be non-zero")]
    ZeroTimeout,
}

#[derive(Deserialize)]
struct RawExecutorConfig {
    base_url: String,
    timeout_ms: Option<u64>,
    max_retries: Option<u32>,
    #[serde(default)]
    headers: HashMap<String, String>,
}

/// Validated request-executor configuration.
///
/// Invariants: `base_url` is an absolute http(s) URL and `timeout` is
/// non-zero (both enforced at the construction boundary).
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawExecutorConfig")]
pub struct ExecutorConfig {
    base_url: Url,
    timeout: Duration,
    max_retries: u32,
    headers: HashMap<String, String>,
}

impl TryFrom<RawExecutorConfig> for ExecutorConfig {
    type Error = ConfigError;

    fn try_from(raw: RawExecutorConfig) -> Result<Self, Self::Error> {
        let mut config = ExecutorConfig::new(&raw.base_url)?;
        if let Some(ms) = raw.timeout_ms {
            config = config.with_timeout(Duration::from_millis(ms))?;
        }
        if let Some(max_retries) = raw.max_retries {
            config = config.with_max_retries(max_retries);
        }
        for (name, value) in raw.headers {
            config = config.with_header(name, value);
        }
        Ok(config)
    }
}

impl ExecutorConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let parsed = Url::parse(base_url).map_err(|_| ConfigError::InvalidBaseUrl {
            url: base_url.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidBaseUrl {
                url: base_url.to_string(),
            });
        }
        Ok(Self {
            base_url: parsed,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            headers: HashMap::new(),
        })
    }

    /// Resolve the base URL from `PLUTUS_API_BASE_URL`, once at startup.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var(BASE_URL_ENV_VAR)
            .map_err(|_| ConfigError::MissingBaseUrl(BASE_URL_ENV_VAR))?;
        Self::new(&url)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, ConfigError> {
        if timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        self.timeout = timeout;
        Ok(self)
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Default header sent with every request, beneath per-call headers.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    #[must_use]
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }
}
