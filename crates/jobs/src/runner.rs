// crates/jobs/src/runner.rs
//! Central job runner that owns all named background jobs.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::ThreadId;

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use super::state::JobState;
use super::types::{JobHandle, JobSnapshot};

/// What a job's work closure gets to see of its own job.
pub struct JobContext {
    state: Arc<JobState>,
}

impl JobContext {
    pub fn name(&self) -> &str {
        self.state.name()
    }

    /// Attach a progress message to the job's snapshot.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.state.set_message(msg);
    }
}

/// Runs background jobs keyed by a unique name.
///
/// Work is spawned onto the tokio runtime passed to [`JobRunner::new`], so
/// jobs can be enqueued from plain threads that are not inside the runtime.
pub struct JobRunner {
    runtime: Handle,
    next_id: AtomicU64,
    jobs: RwLock<HashMap<String, Arc<JobState>>>,
    observer_thread: Option<ThreadId>,
}

impl JobRunner {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            next_id: AtomicU64::new(1),
            jobs: RwLock::new(HashMap::new()),
            observer_thread: None,
        }
    }

    /// Only accept observer (de)registration on `thread` for jobs created
    /// from now on.
    pub fn with_observer_thread(mut self, thread: ThreadId) -> Self {
        self.observer_thread = Some(thread);
        self
    }

    /// Enqueue a job under `name`, or join the one already in flight.
    ///
    /// If a job with this name is `Enqueued` or `Running`, its handle is
    /// returned and `work` is dropped without running. A finished job with
    /// the same name is replaced by a fresh one.
    ///
    /// `work` resolves to `Err(message)` to fail the job. A panic inside the
    /// work fails the job as well.
    pub fn enqueue_or_join<F, Fut>(&self, name: impl Into<String>, work: F) -> JobHandle
    where
        F: FnOnce(JobContext) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), String>> + Send + 'static,
    {
        let name = name.into();
        let mut jobs = self.jobs_write();

        if let Some(existing) = jobs.get(&name) {
            if !existing.status().is_terminal() {
                tracing::debug!(job = %name, job_id = existing.id(), "joining job already in flight");
                return JobHandle::new(Arc::clone(existing));
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let state = Arc::new(JobState::new(id, name.clone(), self.observer_thread, cancel_tx));
        jobs.insert(name.clone(), Arc::clone(&state));
        tracing::info!(job = %name, job_id = id, "job enqueued");

        self.runtime.spawn(run_job(Arc::clone(&state), cancel_rx, work));
        JobHandle::new(state)
    }

    /// Look up the current job for `name`.
    pub fn get(&self, name: &str) -> Option<JobHandle> {
        self.jobs_read()
            .get(name)
            .map(|state| JobHandle::new(Arc::clone(state)))
    }

    /// Snapshots of every job that has not reached a terminal state.
    pub fn active_jobs(&self) -> Vec<JobSnapshot> {
        self.jobs_read()
            .values()
            .filter(|state| !state.status().is_terminal())
            .map(|state| state.snapshot())
            .collect()
    }

    /// Drop finished jobs from the table. Returns how many were removed.
    ///
    /// Outstanding handles keep working; the job just can no longer be
    /// found by name.
    pub fn prune_finished(&self) -> usize {
        let mut jobs = self.jobs_write();
        let before = jobs.len();
        jobs.retain(|_, state| !state.status().is_terminal());
        before - jobs.len()
    }

    fn jobs_read(&self) -> RwLockReadGuard<'_, HashMap<String, Arc<JobState>>> {
        self.jobs.read().unwrap_or_else(|poisoned| {
            tracing::error!("RwLock poisoned reading jobs map");
            poisoned.into_inner()
        })
    }

    fn jobs_write(&self) -> RwLockWriteGuard<'_, HashMap<String, Arc<JobState>>> {
        self.jobs.write().unwrap_or_else(|poisoned| {
            tracing::error!("RwLock poisoned writing jobs map");
            poisoned.into_inner()
        })
    }
}

async fn run_job<F, Fut>(state: Arc<JobState>, mut cancel_rx: oneshot::Receiver<()>, work: F)
where
    F: FnOnce(JobContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), String>> + Send + 'static,
{
    if cancel_rx.try_recv().is_ok() {
        state.mark_cancelled("cancelled before start");
        return;
    }

    state.set_running();
    let ctx = JobContext {
        state: Arc::clone(&state),
    };
    let mut work_task = tokio::spawn(work(ctx));

    tokio::select! {
        biased;
        Ok(()) = &mut cancel_rx => {
            work_task.abort();
            state.mark_cancelled("cancelled while running");
            tracing::info!(job = %state.name(), "job cancelled");
        }
        joined = &mut work_task => match joined {
            Ok(Ok(())) => {
                state.succeed();
            }
            Ok(Err(e)) => {
                tracing::warn!(job = %state.name(), error = %e, "job failed");
                state.fail(e);
            }
            Err(e) => {
                tracing::error!(job = %state.name(), error = %e, "job task did not finish");
                state.fail(format!("job task did not finish: {e}"));
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::JobStatus;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::time::Duration;

    async fn wait_for_status(handle: &JobHandle, status: JobStatus) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while handle.current_state() != status {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("job never reached {status}, is {}", handle.current_state()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_runner_start_and_complete() {
        let runner = JobRunner::new(Handle::current());

        let handle = runner.enqueue_or_join("test", |ctx| async move {
            ctx.set_message("working");
            Ok(())
        });

        wait_for_status(&handle, JobStatus::Succeeded).await;
        let snap = runner.get("test").unwrap().snapshot();
        assert_eq!(snap.status, JobStatus::Succeeded);
        assert_eq!(snap.message, Some("working".to_string()));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_runner_failure() {
        let runner = JobRunner::new(Handle::current());

        let handle = runner.enqueue_or_join("test", |_ctx| async move {
            Err("something went wrong".to_string())
        });

        wait_for_status(&handle, JobStatus::Failed).await;
        assert_eq!(
            handle.snapshot().message,
            Some("something went wrong".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_runner_panicking_work_fails_job() {
        let runner = JobRunner::new(Handle::current());

        let explode = true;
        let handle = runner.enqueue_or_join("test", move |_ctx| async move {
            if explode {
                panic!("boom");
            }
            Ok(())
        });

        wait_for_status(&handle, JobStatus::Failed).await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_job_runner_cancellation_while_running() {
        let runner = JobRunner::new(Handle::current());

        let handle = runner.enqueue_or_join("test", |_ctx| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        });

        wait_for_status(&handle, JobStatus::Running).await;
        assert!(handle.cancel());
        wait_for_status(&handle, JobStatus::Cancelled).await;
        assert!(!handle.cancel());
    }

    #[tokio::test]
    async fn test_job_runner_cancellation_before_start() {
        // Current-thread runtime: the job task cannot start before we yield.
        let runner = JobRunner::new(Handle::current());
        let ran = Arc::new(AtomicUsize::new(0));
        let ran_in_job = Arc::clone(&ran);

        let handle = runner.enqueue_or_join("test", move |_ctx| async move {
            ran_in_job.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        assert_eq!(handle.current_state(), JobStatus::Enqueued);
        assert!(handle.cancel());

        wait_for_status(&handle, JobStatus::Cancelled).await;
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert_eq!(
            handle.snapshot().message,
            Some("cancelled before start".to_string())
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_enqueue_or_join_reuses_in_flight_job() {
        let runner = JobRunner::new(Handle::current());
        let runs = Arc::new(AtomicUsize::new(0));

        let first_runs = Arc::clone(&runs);
        let first = runner.enqueue_or_join("sync", move |_ctx| async move {
            first_runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        });
        let second_runs = Arc::clone(&runs);
        let second = runner.enqueue_or_join("sync", move |_ctx| async move {
            second_runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(first.same_job(&second));
        assert_eq!(first.id(), second.id());
        wait_for_status(&second, JobStatus::Succeeded).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_finished_job_name_is_reused() {
        let runner = JobRunner::new(Handle::current());

        let first = runner.enqueue_or_join("sync", |_ctx| async move { Ok(()) });
        wait_for_status(&first, JobStatus::Succeeded).await;

        let second = runner.enqueue_or_join("sync", |_ctx| async move { Ok(()) });
        assert!(!first.same_job(&second));
        assert!(second.id() > first.id());
    }

    #[test]
    fn test_concurrent_enqueue_same_name_starts_one_job() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let runner = Arc::new(JobRunner::new(rt.handle().clone()));
        let runs = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let runner = Arc::clone(&runner);
                let runs = Arc::clone(&runs);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    runner.enqueue_or_join("shared", move |_ctx| async move {
                        runs.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        Ok(())
                    })
                })
            })
            .collect();
        let handles: Vec<JobHandle> = threads.into_iter().map(|t| t.join().unwrap()).collect();

        assert!(handles.iter().all(|h| h.same_job(&handles[0])));
        rt.block_on(wait_for_status(&handles[0], JobStatus::Succeeded));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_active_jobs_and_prune() {
        let runner = JobRunner::new(Handle::current());

        let _slow = runner.enqueue_or_join("slow", |_ctx| async move {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(())
        });
        let quick = runner.enqueue_or_join("quick", |_ctx| async move { Ok(()) });
        wait_for_status(&quick, JobStatus::Succeeded).await;

        let active = runner.active_jobs();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "slow");

        assert_eq!(runner.prune_finished(), 1);
        assert!(runner.get("quick").is_none());
        assert!(runner.get("slow").is_some());
        // The pruned job's handle still answers.
        assert_eq!(quick.current_state(), JobStatus::Succeeded);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_observer_thread_restriction_applies_to_new_jobs() {
        let other = std::thread::spawn(|| std::thread::current().id())
            .join()
            .unwrap();
        let runner = JobRunner::new(Handle::current()).with_observer_thread(other);

        let handle = runner.enqueue_or_join("restricted", |_ctx| async move { Ok(()) });
        assert!(handle.subscribe(|_| {}).is_err());
        assert_eq!(handle.observer_count(), 0);
    }
}
