// crates/bridge/src/lib.rs
//! Blocking bridge from a synchronous sync-request callback to named
//! background jobs.
//!
//! A [`SyncRequestDispatcher`] checks the account and sync conditions,
//! enqueues (or joins) the job for the request and parks the calling thread
//! in a [`CompletionWatcher`] until the job is terminal, the wait times out,
//! or the caller is interrupted. Observer (de)registration happens on a
//! [`DesignatedThread`].

pub mod account;
pub mod conditions;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod interrupt;
pub mod scheduler;
pub mod service;
pub mod watcher;

pub use account::{AccountContext, AccountRef, AccountResolver, AccountSettings, InMemoryAccounts};
pub use conditions::{AlwaysMet, NetworkProbe, StaticNetwork, SyncConditions, WifiConditions};
pub use config::BridgeConfig;
pub use dispatcher::{SyncRequest, SyncRequestDispatcher};
pub use error::{BridgeError, Result};
pub use executor::{AffinityExecutor, DesignatedThread, InlineExecutor};
pub use interrupt::Interrupt;
pub use scheduler::{job_name_for, RunnerScheduler, SyncJobParams, SyncJobScheduler, SyncWork};
pub use service::SyncBridge;
pub use watcher::{CompletionWatcher, WaitOutcome};
