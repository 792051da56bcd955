// crates/observability/src/lib.rs
//! Tracing subscriber setup shared by the sync-bridge binaries.

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "warn,sync_bridge=info,sync_bridge_jobs=info";

pub const LOG_JSON_ENV: &str = "SYNC_BRIDGE_LOG_JSON";

#[derive(Debug, Error)]
pub enum ObservabilityError {
    #[error("Failed to install tracing subscriber: {0}")]
    Init(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    pub default_filter: String,
    /// Emit one JSON object per event instead of compact text.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

impl LogConfig {
    pub fn from_env() -> Self {
        let json = std::env::var(LOG_JSON_ENV)
            .map(|v| is_truthy(&v))
            .unwrap_or(false);
        Self {
            json,
            ..Self::default()
        }
    }

    /// `RUST_LOG` when it parses, else the configured default.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_filter))
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), ObservabilityError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(config.env_filter())
        .with_thread_names(true);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    result.map_err(|e| ObservabilityError::Init(e.to_string()))
}
