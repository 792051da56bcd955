// crates/bridge/src/error.rs
use sync_bridge_jobs::JobError;
use thiserror::Error;

/// Errors produced inside the bridge.
///
/// None of these reach the legacy caller; the dispatcher logs and returns.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Designated thread has stopped accepting work")]
    ExecutorStopped,

    #[error("Action on designated thread panicked")]
    ActionPanicked,

    #[error("Cannot block on the designated thread from inside an async runtime")]
    AsyncContext,

    #[error("Could not enqueue sync job: {0}")]
    Schedule(String),

    #[error("Failed to spawn designated thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
