// crates/bridge/src/scheduler.rs
//! Enqueue-or-join seam between the dispatcher and the job runner.

use std::sync::Arc;

use async_trait::async_trait;
use sync_bridge_jobs::{JobContext, JobHandle, JobRunner};

use crate::account::AccountRef;
use crate::error::Result;

/// Parameters handed to the sync job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncJobParams {
    pub account: AccountRef,
    pub authority: String,
    /// Caller asked for local changes to be pushed.
    pub upload: bool,
}

/// Unique job name for syncing `authority` of `account`.
///
/// The upload hint is not part of the name, so uploads and downloads for
/// the same data join one job.
pub fn job_name_for(account: &AccountRef, authority: &str) -> String {
    format!("explicit-sync {authority} {account}")
}

/// Accepts enqueue-or-join requests for named sync jobs.
pub trait SyncJobScheduler: Send + Sync {
    fn enqueue_or_join(&self, job_name: &str, params: SyncJobParams) -> Result<JobHandle>;
}

/// The data synchronization itself, run inside the job.
#[async_trait]
pub trait SyncWork: Send + Sync + 'static {
    async fn perform(&self, ctx: &JobContext, params: SyncJobParams) -> std::result::Result<(), String>;
}

/// Schedules [`SyncWork`] on a [`JobRunner`].
///
/// Finished jobs are dropped from the runner's table before each enqueue, so
/// the table holds live jobs plus those finished since the last request.
pub struct RunnerScheduler {
    runner: Arc<JobRunner>,
    work: Arc<dyn SyncWork>,
}

impl RunnerScheduler {
    pub fn new(runner: Arc<JobRunner>, work: Arc<dyn SyncWork>) -> Self {
        Self { runner, work }
    }
}

impl SyncJobScheduler for RunnerScheduler {
    fn enqueue_or_join(&self, job_name: &str, params: SyncJobParams) -> Result<JobHandle> {
        let pruned = self.runner.prune_finished();
        if pruned > 0 {
            tracing::debug!(pruned, "dropped finished sync jobs");
        }
        let work = Arc::clone(&self.work);
        Ok(self.runner.enqueue_or_join(job_name, move |ctx| async move {
            ctx.set_message(if params.upload { "uploading" } else { "syncing" });
            work.perform(&ctx, params).await
        }))
    }
}
