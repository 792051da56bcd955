// crates/jobs/src/state.rs
//! Shared state for a single named background job.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::ThreadId;

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use super::types::{JobError, JobId, JobSnapshot, JobStatus, SubscriptionToken};

/// Callback invoked with the job's status on every state change.
pub(crate) type JobObserver = Arc<dyn Fn(JobStatus) + Send + Sync>;

struct Lifecycle {
    status: JobStatus,
    message: Option<String>,
    finished_at: Option<DateTime<Utc>>,
    observers: BTreeMap<SubscriptionToken, JobObserver>,
    next_token: u64,
}

/// State of one job, owned by the [`JobRunner`](super::JobRunner).
///
/// Only the runner's task moves the status forward. Observers are called
/// after the lock is released, so an observer may query the job (or
/// unsubscribe) without deadlocking.
pub struct JobState {
    id: JobId,
    name: String,
    enqueued_at: DateTime<Utc>,
    observer_thread: Option<ThreadId>,
    lifecycle: Mutex<Lifecycle>,
    cancel_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl JobState {
    /// Create an `Enqueued` job.
    ///
    /// When `observer_thread` is set, (de)registration of observers is only
    /// accepted on that thread.
    pub(crate) fn new(
        id: JobId,
        name: String,
        observer_thread: Option<ThreadId>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            id,
            name,
            enqueued_at: Utc::now(),
            observer_thread,
            lifecycle: Mutex::new(Lifecycle {
                status: JobStatus::Enqueued,
                message: None,
                finished_at: None,
                observers: BTreeMap::new(),
                next_token: 1,
            }),
            cancel_tx: Mutex::new(Some(cancel_tx)),
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> JobStatus {
        self.lifecycle().status
    }

    /// Transition `Enqueued -> Running`.
    pub(crate) fn set_running(&self) -> bool {
        self.transition(JobStatus::Running, None)
    }

    pub(crate) fn succeed(&self) -> bool {
        self.transition(JobStatus::Succeeded, None)
    }

    pub(crate) fn fail(&self, error: impl Into<String>) -> bool {
        self.transition(JobStatus::Failed, Some(error.into()))
    }

    pub(crate) fn mark_cancelled(&self, reason: impl Into<String>) -> bool {
        self.transition(JobStatus::Cancelled, Some(reason.into()))
    }

    /// Set the human-readable progress message. Observers are not notified.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.lifecycle().message = Some(msg.into());
    }

    pub(crate) fn subscribe(&self, observer: JobObserver) -> Result<SubscriptionToken, JobError> {
        self.check_observer_thread()?;
        let (token, current) = {
            let mut lifecycle = self.lifecycle();
            let token = SubscriptionToken(lifecycle.next_token);
            lifecycle.next_token += 1;
            lifecycle.observers.insert(token, Arc::clone(&observer));
            (token, lifecycle.status)
        };
        // Deliver the current state so a job that already finished is seen.
        observer(current);
        Ok(token)
    }

    pub(crate) fn unsubscribe(&self, token: SubscriptionToken) -> Result<bool, JobError> {
        self.check_observer_thread()?;
        Ok(self.lifecycle().observers.remove(&token).is_some())
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.lifecycle().observers.len()
    }

    /// Signal the running task to stop. Returns true if a live task received it.
    pub(crate) fn request_cancel(&self) -> bool {
        let tx = match self.cancel_tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => {
                tracing::error!(job = %self.name, "cancel lock poisoned");
                poisoned.into_inner().take()
            }
        };
        match tx {
            Some(tx) => tx.send(()).is_ok(),
            None => false,
        }
    }

    pub fn snapshot(&self) -> JobSnapshot {
        let lifecycle = self.lifecycle();
        JobSnapshot {
            job_id: self.id,
            name: self.name.clone(),
            status: lifecycle.status,
            message: lifecycle.message.clone(),
            enqueued_at: self.enqueued_at.to_rfc3339(),
            finished_at: lifecycle.finished_at.map(|t| t.to_rfc3339()),
        }
    }

    /// Move to `next` and notify observers. Terminal states are final.
    fn transition(&self, next: JobStatus, message: Option<String>) -> bool {
        let observers: Vec<JobObserver> = {
            let mut lifecycle = self.lifecycle();
            if lifecycle.status.is_terminal() || lifecycle.status == next {
                return false;
            }
            lifecycle.status = next;
            if message.is_some() {
                lifecycle.message = message;
            }
            if next.is_terminal() {
                lifecycle.finished_at = Some(Utc::now());
            }
            lifecycle.observers.values().cloned().collect()
        };
        tracing::debug!(job = %self.name, job_id = self.id, status = %next, "job state changed");
        for observer in observers {
            observer(next);
        }
        true
    }

    fn check_observer_thread(&self) -> Result<(), JobError> {
        match self.observer_thread {
            Some(expected) if expected != std::thread::current().id() => {
                Err(JobError::ForeignObserverThread {
                    job: self.name.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(|poisoned| {
            tracing::error!(job = %self.name, "job state lock poisoned");
            poisoned.into_inner()
        })
    }
}
