// crates/bridge/src/executor.rs
//! Running actions on the one thread allowed to touch job observers.
//!
//! [`DesignatedThread`] owns a task queue drained by a dedicated OS thread.
//! A caller hands it an action and blocks on a one-shot reply until the
//! action has run there. [`InlineExecutor`] runs actions on the calling
//! thread and is meant for tests and single-threaded embedders.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::sync::{mpsc, oneshot};

use crate::error::{BridgeError, Result};

/// A unit of work to run on the designated thread.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Runs actions on one designated thread, returning once they complete.
pub trait AffinityExecutor: Send + Sync {
    /// Run `action` on the designated thread and block until it has finished.
    fn run_on_designated_thread(&self, action: Action) -> Result<()>;

    /// Thread that observers must be (de)registered on, if restricted.
    fn designated_thread_id(&self) -> Option<ThreadId>;
}

/// Run `f` on the designated thread and hand its return value back.
pub fn run_with_result<T, F>(executor: &dyn AffinityExecutor, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, mut rx) = oneshot::channel();
    executor.run_on_designated_thread(Box::new(move || {
        let _ = tx.send(f());
    }))?;
    rx.try_recv().map_err(|_| BridgeError::ActionPanicked)
}

struct Task {
    action: Action,
    done: oneshot::Sender<bool>,
}

/// A dedicated OS thread that drains a queue of [`Action`]s.
///
/// Submissions from many callers may interleave in any order. The thread
/// stops when [`DesignatedThread::shutdown`] is called or the value is
/// dropped; queued actions still run first.
pub struct DesignatedThread {
    thread_id: ThreadId,
    queue: Mutex<Option<mpsc::UnboundedSender<Task>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl DesignatedThread {
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
        let join = thread::Builder::new().name(name.into()).spawn(move || {
            while let Some(task) = rx.blocking_recv() {
                let completed = panic::catch_unwind(AssertUnwindSafe(task.action)).is_ok();
                if !completed {
                    tracing::error!("action panicked on designated thread");
                }
                let _ = task.done.send(completed);
            }
            tracing::debug!("designated thread exiting");
        })?;

        Ok(Self {
            thread_id: join.thread().id(),
            queue: Mutex::new(Some(tx)),
            join: Mutex::new(Some(join)),
        })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    /// Stop accepting actions and wait for the thread to drain its queue.
    pub fn shutdown(&self) {
        drop(lock(&self.queue).take());
        let join = lock(&self.join).take();
        if let Some(join) = join {
            if thread::current().id() == self.thread_id {
                // Cannot join ourselves; the loop ends once the queue closes.
                return;
            }
            if join.join().is_err() {
                tracing::error!("designated thread terminated abnormally");
            }
        }
    }
}

impl AffinityExecutor for DesignatedThread {
    fn run_on_designated_thread(&self, action: Action) -> Result<()> {
        if thread::current().id() == self.thread_id {
            // Already there: queueing would wait on ourselves.
            return run_inline(action);
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(BridgeError::AsyncContext);
        }

        let (done_tx, done_rx) = oneshot::channel();
        {
            let queue = lock(&self.queue);
            let queue = queue.as_ref().ok_or(BridgeError::ExecutorStopped)?;
            queue
                .send(Task {
                    action,
                    done: done_tx,
                })
                .map_err(|_| BridgeError::ExecutorStopped)?;
        }

        match done_rx.blocking_recv() {
            Ok(true) => Ok(()),
            Ok(false) => Err(BridgeError::ActionPanicked),
            Err(_) => Err(BridgeError::ExecutorStopped),
        }
    }

    fn designated_thread_id(&self) -> Option<ThreadId> {
        Some(self.thread_id)
    }
}

impl Drop for DesignatedThread {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs every action directly on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl AffinityExecutor for InlineExecutor {
    fn run_on_designated_thread(&self, action: Action) -> Result<()> {
        run_inline(action)
    }

    fn designated_thread_id(&self) -> Option<ThreadId> {
        None
    }
}

fn run_inline(action: Action) -> Result<()> {
    panic::catch_unwind(AssertUnwindSafe(action)).map_err(|_| BridgeError::ActionPanicked)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::error!("designated thread lock poisoned");
        poisoned.into_inner()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_action_runs_on_designated_thread() {
        let designated = DesignatedThread::spawn("test-designated").unwrap();
        let ran_on = run_with_result(&designated, || thread::current().id()).unwrap();
        assert_eq!(ran_on, designated.thread_id());
        assert_ne!(ran_on, thread::current().id());
    }

    #[test]
    fn test_caller_blocks_until_action_completes() {
        let designated = DesignatedThread::spawn("test-designated").unwrap();
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);

        designated
            .run_on_designated_thread(Box::new(move || {
                thread::sleep(Duration::from_millis(50));
                flag.store(true, Ordering::SeqCst);
            }))
            .unwrap();

        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn test_panicking_action_is_reported_and_thread_survives() {
        let designated = DesignatedThread::spawn("test-designated").unwrap();

        let err = designated
            .run_on_designated_thread(Box::new(|| panic!("observer blew up")))
            .unwrap_err();
        assert!(matches!(err, BridgeError::ActionPanicked));

        assert_eq!(run_with_result(&designated, || 7).unwrap(), 7);
    }

    #[test]
    fn test_nested_submission_runs_inline() {
        let designated = Arc::new(DesignatedThread::spawn("test-designated").unwrap());
        let inner = Arc::clone(&designated);

        let nested = run_with_result(designated.as_ref(), move || {
            run_with_result(inner.as_ref(), || 5).unwrap()
        })
        .unwrap();
        assert_eq!(nested, 5);
    }

    #[test]
    fn test_shutdown_rejects_new_actions() {
        let designated = DesignatedThread::spawn("test-designated").unwrap();
        designated.shutdown();

        let err = designated.run_on_designated_thread(Box::new(|| {})).unwrap_err();
        assert!(matches!(err, BridgeError::ExecutorStopped));
    }

    #[test]
    fn test_concurrent_submissions_all_complete() {
        let designated = Arc::new(DesignatedThread::spawn("test-designated").unwrap());
        let count = Arc::new(AtomicUsize::new(0));

        let callers: Vec<_> = (0..16)
            .map(|_| {
                let designated = Arc::clone(&designated);
                let count = Arc::clone(&count);
                thread::spawn(move || {
                    designated
                        .run_on_designated_thread(Box::new(move || {
                            count.fetch_add(1, Ordering::SeqCst);
                        }))
                        .unwrap();
                })
            })
            .collect();
        for caller in callers {
            caller.join().unwrap();
        }

        assert_eq!(count.load(Ordering::SeqCst), 16);
    }

    #[test]
    fn test_inline_executor_runs_on_caller() {
        let ran_on = run_with_result(&InlineExecutor, || thread::current().id()).unwrap();
        assert_eq!(ran_on, thread::current().id());
        assert!(InlineExecutor.designated_thread_id().is_none());
    }
}
