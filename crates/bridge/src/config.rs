// crates/bridge/src/config.rs
//! Bridge configuration from environment variables with defaults.

use std::time::Duration;

use crate::error::{BridgeError, Result};

/// Upper bound on how long one sync request blocks its caller.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Name given to the designated observer thread.
pub const DEFAULT_DESIGNATED_THREAD_NAME: &str = "sync-bridge-observer";

pub const WAIT_TIMEOUT_ENV: &str = "SYNC_BRIDGE_WAIT_TIMEOUT_SECS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    pub wait_timeout: Duration,
    pub designated_thread_name: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
            designated_thread_name: DEFAULT_DESIGNATED_THREAD_NAME.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Read overrides from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(WAIT_TIMEOUT_ENV) {
            match parse_timeout_secs(&raw) {
                Ok(timeout) => config.wait_timeout = timeout,
                Err(e) => tracing::warn!(
                    var = WAIT_TIMEOUT_ENV,
                    value = %raw,
                    error = %e,
                    "ignoring invalid wait timeout"
                ),
            }
        }
        config
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

/// Parse a whole number of seconds. Zero is rejected; values past what an
/// `Instant` can hold mean "no deadline".
pub fn parse_timeout_secs(raw: &str) -> Result<Duration> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|_| BridgeError::Config(format!("not a number of seconds: {raw:?}")))?;
    if secs == 0 {
        return Err(BridgeError::Config("wait timeout must be positive".into()));
    }
    Ok(Duration::from_secs(secs))
}
