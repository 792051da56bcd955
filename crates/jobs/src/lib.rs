// crates/jobs/src/lib.rs
//! Named background job system.
//!
//! Provides:
//! - `JobRunner`: enqueue-or-join jobs by unique name on a tokio runtime
//! - `JobState`: lifecycle and observer registry per job
//! - `JobHandle`: non-owning view used to query, observe and cancel a job
//! - `JobSnapshot`: serializable point-in-time view

pub mod runner;
pub mod state;
pub mod types;

pub use runner::{JobContext, JobRunner};
pub use state::JobState;
pub use types::{JobError, JobHandle, JobId, JobSnapshot, JobStatus, SubscriptionToken};
