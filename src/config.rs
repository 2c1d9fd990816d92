//! Store configuration
//!
//! Plain values with defaults, overridable from the environment:
//!
//! - `DOCDEX_REDIS_URL` - server URL
//! - `DOCDEX_OP_TIMEOUT_MS` - per-operation deadline in milliseconds
//! - `DOCDEX_TEMP_PREFIX` - prefix of transient keys

use std::time::Duration;

use crate::error::{StoreError, StoreResult};

/// Environment variable naming the server URL
pub const ENV_REDIS_URL: &str = "DOCDEX_REDIS_URL";
/// Environment variable holding the operation timeout in milliseconds
pub const ENV_OP_TIMEOUT_MS: &str = "DOCDEX_OP_TIMEOUT_MS";
/// Environment variable holding the temporary key prefix
pub const ENV_TEMP_PREFIX: &str = "DOCDEX_TEMP_PREFIX";

/// Configuration shared by every operation of a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Redis server URL
    pub redis_url: String,
    /// Deadline applied when the caller's context has none
    pub op_timeout: Option<Duration>,
    /// Prefix of temporary keys
    pub temp_key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            op_timeout: None,
            temp_key_prefix: "tmp".to_string(),
        }
    }
}

impl StoreConfig {
    /// Reads overrides from the process environment.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads overrides through `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> StoreResult<Self> {
        let mut config = Self::default();

        if let Some(url) = lookup(ENV_REDIS_URL) {
            config.redis_url = url;
        }
        if let Some(raw) = lookup(ENV_OP_TIMEOUT_MS) {
            let ms: u64 = raw.trim().parse().map_err(|_| {
                StoreError::invalid_value(format!(
                    "{} must be a whole number of milliseconds, got '{}'",
                    ENV_OP_TIMEOUT_MS, raw
                ))
            })?;
            config.op_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(prefix) = lookup(ENV_TEMP_PREFIX) {
            if prefix.is_empty() {
                return Err(StoreError::invalid_value(format!(
                    "{} must not be empty",
                    ENV_TEMP_PREFIX
                )));
            }
            config.temp_key_prefix = prefix;
        }

        Ok(config)
    }

    /// Sets the server URL.
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = url.into();
        self
    }

    /// Sets the default operation timeout.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = Some(timeout);
        self
    }

    /// Sets the temporary key prefix.
    pub fn with_temp_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.temp_key_prefix = prefix.into();
        self
    }
}
