// crates/bridge/src/watcher.rs
//! Blocking a synchronous caller until a job reaches a terminal state.
//!
//! One wait goes `Idle -> Observing -> {Completed | TimedOut | Interrupted}`:
//!
//! 1. An observer is registered on the job through the [`AffinityExecutor`].
//!    It ignores non-terminal states and signals a private [`WaitContext`]
//!    on the first terminal one.
//! 2. The calling thread parks on the context until signalled, interrupted,
//!    or the deadline passes. A job that finished before registration is
//!    seen at once, because subscribing delivers the current state.
//! 3. The observer is deregistered through the executor on every exit path.
//!
//! Neither a timeout nor an interrupt touches the job itself.

use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use sync_bridge_jobs::{JobHandle, JobStatus, SubscriptionToken};

use crate::error::{BridgeError, Result};
use crate::executor::{run_with_result, AffinityExecutor};
use crate::interrupt::Interrupt;

/// How a wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The job reached this terminal state.
    Completed(JobStatus),
    /// The deadline passed first; the job keeps running.
    TimedOut,
    /// The caller was interrupted; the job keeps running.
    Interrupted,
    /// The observer could not be registered, so no wait took place.
    NotObserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Pending,
    Finished(JobStatus),
    Interrupted,
}

/// Per-wait synchronization: an outcome value guarded by a mutex and
/// condition variable. Leaves `Pending` at most once.
pub(crate) struct WaitContext {
    signal: Mutex<Signal>,
    cond: Condvar,
}

impl WaitContext {
    pub(crate) fn new() -> Self {
        Self {
            signal: Mutex::new(Signal::Pending),
            cond: Condvar::new(),
        }
    }

    /// Record a terminal state. Returns false if the wait was already decided.
    pub(crate) fn finish(&self, status: JobStatus) -> bool {
        self.settle(Signal::Finished(status))
    }

    pub(crate) fn interrupt(&self) -> bool {
        self.settle(Signal::Interrupted)
    }

    fn settle(&self, next: Signal) -> bool {
        let mut signal = self.signal();
        if *signal != Signal::Pending {
            return false;
        }
        *signal = next;
        self.cond.notify_all();
        true
    }

    /// Park until the context is settled or `deadline` passes. `None` waits
    /// without a deadline.
    fn wait_until(&self, deadline: Option<Instant>) -> WaitOutcome {
        let mut signal = self.signal();
        loop {
            match *signal {
                Signal::Finished(status) => return WaitOutcome::Completed(status),
                Signal::Interrupted => return WaitOutcome::Interrupted,
                Signal::Pending => {}
            }
            let waited = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return WaitOutcome::TimedOut;
                    }
                    self.cond
                        .wait_timeout(signal, deadline - now)
                        .map(|(guard, _)| guard)
                        .map_err(|poisoned| poisoned.into_inner().0)
                }
                None => self.cond.wait(signal).map_err(|poisoned| poisoned.into_inner()),
            };
            signal = waited.unwrap_or_else(|guard| {
                tracing::error!("wait context lock poisoned");
                guard
            });
        }
    }

    fn signal(&self) -> MutexGuard<'_, Signal> {
        self.signal.lock().unwrap_or_else(|poisoned| {
            tracing::error!("wait context lock poisoned");
            poisoned.into_inner()
        })
    }
}

/// Waits for jobs on behalf of synchronous callers.
#[derive(Clone)]
pub struct CompletionWatcher {
    executor: Arc<dyn AffinityExecutor>,
}

impl CompletionWatcher {
    pub fn new(executor: Arc<dyn AffinityExecutor>) -> Self {
        Self { executor }
    }

    /// Block until `handle` is terminal or `timeout` has elapsed.
    pub fn wait_for_terminal(&self, handle: &JobHandle, timeout: Duration) -> WaitOutcome {
        self.wait_for_terminal_interruptible(handle, timeout, &Interrupt::new())
    }

    /// Like [`wait_for_terminal`](Self::wait_for_terminal), but also ends
    /// early when `interrupt` fires.
    pub fn wait_for_terminal_interruptible(
        &self,
        handle: &JobHandle,
        timeout: Duration,
        interrupt: &Interrupt,
    ) -> WaitOutcome {
        let started = Instant::now();
        // A budget too large for `Instant` is treated as unbounded.
        let deadline = started.checked_add(timeout);
        let ctx = Arc::new(WaitContext::new());

        let token = match self.register(handle, &ctx) {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(job = %handle.name(), error = %e, "could not observe job, not waiting");
                return WaitOutcome::NotObserved;
            }
        };

        if interrupt.arm(&ctx) {
            ctx.interrupt();
        }
        let outcome = ctx.wait_until(deadline);
        interrupt.disarm(outcome == WaitOutcome::Interrupted);

        self.deregister(handle, token);

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            WaitOutcome::Completed(status) => {
                tracing::debug!(job = %handle.name(), %status, elapsed_ms, "job finished while waiting");
            }
            WaitOutcome::TimedOut => {
                tracing::debug!(job = %handle.name(), elapsed_ms, "wait timed out, job may still be running");
            }
            WaitOutcome::Interrupted => {
                tracing::info!(job = %handle.name(), elapsed_ms, "interrupted while waiting, job may still be running");
            }
            WaitOutcome::NotObserved => {}
        }
        outcome
    }

    fn register(&self, handle: &JobHandle, ctx: &Arc<WaitContext>) -> Result<SubscriptionToken> {
        let job = handle.clone();
        let observer_ctx = Arc::clone(ctx);
        let subscribed = run_with_result(self.executor.as_ref(), move || {
            job.subscribe(move |status| {
                if status.is_terminal() {
                    observer_ctx.finish(status);
                }
            })
        })?;
        subscribed.map_err(BridgeError::from)
    }

    fn deregister(&self, handle: &JobHandle, token: SubscriptionToken) {
        let job = handle.clone();
        let removed = run_with_result(self.executor.as_ref(), move || job.unsubscribe(token))
            .and_then(|removed| removed.map_err(BridgeError::from));
        match removed {
            Ok(true) => {}
            Ok(false) => tracing::warn!(job = %handle.name(), "observer was already deregistered"),
            Err(e) => tracing::error!(job = %handle.name(), error = %e, "failed to deregister job observer"),
        }
    }
}
