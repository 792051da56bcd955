// crates/jobs/src/types.rs
//! Types for the named background job system.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use super::state::{JobObserver, JobState};

/// Process-unique identifier assigned to each job instance.
///
/// Two jobs enqueued under the same name at different times get different ids.
pub type JobId = u64;

/// Lifecycle status of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum JobStatus {
    Enqueued = 0,
    Running = 1,
    Succeeded = 2,
    Failed = 3,
    Cancelled = 4,
}

impl JobStatus {
    /// Stable snake_case representation used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Enqueued => "enqueued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true when the job cannot transition any further.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one observer registration on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(pub(crate) u64);

/// Errors raised by the job system.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("observers of job {job} must be (de)registered on the designated observer thread")]
    ForeignObserverThread { job: String },
}

/// Non-owning view of a job in the runner's table.
///
/// Cloning a handle is cheap; every clone observes the same job. The runner
/// decides when the job leaves its table, a handle never removes it.
#[derive(Clone)]
pub struct JobHandle {
    state: Arc<JobState>,
}

impl JobHandle {
    pub(crate) fn new(state: Arc<JobState>) -> Self {
        Self { state }
    }

    pub fn id(&self) -> JobId {
        self.state.id()
    }

    /// The unique name the job was enqueued under.
    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn current_state(&self) -> JobStatus {
        self.state.status()
    }

    /// Register `observer` for state changes.
    ///
    /// The observer is called once right away with the current state, then
    /// once per transition. Fails if the runner restricts observers to a
    /// designated thread and this is not it.
    pub fn subscribe(
        &self,
        observer: impl Fn(JobStatus) + Send + Sync + 'static,
    ) -> Result<SubscriptionToken, JobError> {
        self.state.subscribe(Arc::new(observer) as JobObserver)
    }

    /// Remove a registration. Returns `Ok(false)` if the token was not registered.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> Result<bool, JobError> {
        self.state.unsubscribe(token)
    }

    /// Number of observers currently registered.
    pub fn observer_count(&self) -> usize {
        self.state.observer_count()
    }

    /// Request cancellation. Returns true if the signal reached a live job.
    pub fn cancel(&self) -> bool {
        self.state.request_cancel()
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.state.snapshot()
    }

    /// True if both handles refer to the same job instance.
    pub fn same_job(&self, other: &JobHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("status", &self.current_state())
            .finish()
    }
}

/// Point-in-time view of a job, for logs and JSON output.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    pub name: String,
    pub status: JobStatus,
    pub message: Option<String>,
    pub enqueued_at: String,
    pub finished_at: Option<String>,
}
