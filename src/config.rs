use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::rate_limit::RateLimitPolicy;
use crate::retry::BackoffPolicy;

pub const DEFAULT_API_URL: &str = "https://api.vectorify.ai/v1/";
pub const DEFAULT_RATE_LIMIT_KEY: &str = "api:rate_limit";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Runtime configuration for the Vectorify client.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_url: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    /// Store key shared by every process talking to the same API.
    pub rate_limit_key: String,
    pub user_agent: String,
    /// Directory for the shared file store; `None` keeps coordination in-process.
    pub state_dir: Option<PathBuf>,
    pub rate_limit: RateLimitPolicy,
    pub backoff: BackoffPolicy,
}

impl Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_limit_key: DEFAULT_RATE_LIMIT_KEY.to_string(),
            user_agent: format!("vectorify/{}", env!("CARGO_PKG_VERSION")),
            state_dir: None,
            rate_limit: RateLimitPolicy::default(),
            backoff: BackoffPolicy::default(),
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_rate_limit_key(mut self, key: impl Into<String>) -> Self {
        self.rate_limit_key = key.into();
        self
    }

    /// Load configuration from environment.
    ///
    /// Env vars:
    /// - VECTORIFY_API_KEY [required]
    /// - VECTORIFY_API_URL (default: https://api.vectorify.ai/v1/)
    /// - VECTORIFY_HTTP_TIMEOUT_SECS (default: 30)
    /// - VECTORIFY_MAX_ATTEMPTS (default: 3)
    /// - VECTORIFY_RATE_LIMIT_KEY (default: api:rate_limit)
    /// - VECTORIFY_STATE_DIR (optional)
    /// - VECTORIFY_USER_AGENT (default: vectorify/<version>)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("VECTORIFY_API_KEY")
            .ok_or_else(|| Error::InvalidConfiguration("Missing VECTORIFY_API_KEY".into()))?;
        let mut cfg = Config::new(api_key);

        if let Some(url) = lookup("VECTORIFY_API_URL") {
            cfg.api_url = url;
        }
        if let Some(raw) = lookup("VECTORIFY_HTTP_TIMEOUT_SECS") {
            cfg.timeout_secs = raw.trim().parse().map_err(|_| {
                Error::InvalidConfiguration(format!("Timeout must be positive, got: {raw}"))
            })?;
        }
        if let Some(raw) = lookup("VECTORIFY_MAX_ATTEMPTS") {
            cfg.max_attempts = raw.trim().parse().map_err(|_| {
                Error::InvalidConfiguration(format!("Invalid VECTORIFY_MAX_ATTEMPTS: {raw}"))
            })?;
        }
        if let Some(key) = lookup("VECTORIFY_RATE_LIMIT_KEY") {
            cfg.rate_limit_key = key;
        }
        cfg.state_dir = lookup("VECTORIFY_STATE_DIR")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);
        if let Some(ua) = lookup("VECTORIFY_USER_AGENT") {
            cfg.user_agent = ua;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject settings the client cannot run with. Trims the API key in place.
    pub fn validate(&mut self) -> Result<()> {
        let trimmed = self.api_key.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidConfiguration("API key cannot be empty".into()));
        }
        self.api_key = trimmed.to_string();

        if self.timeout_secs == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "Timeout must be positive, got: {}",
                self.timeout_secs
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfiguration(
                "max attempts must be at least 1".into(),
            ));
        }
        if self.rate_limit_key.is_empty() {
            return Err(Error::InvalidConfiguration(
                "rate limit key cannot be empty".into(),
            ));
        }
        url::Url::parse(&self.api_url).map_err(|e| {
            Error::InvalidConfiguration(format!("invalid API url {}: {}", self.api_url, e))
        })?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
