// crates/bridge/src/service.rs
//! Wiring of the designated thread, job runner and dispatcher.

use std::sync::Arc;

use sync_bridge_jobs::JobRunner;
use tokio::runtime::Handle;

use crate::account::AccountResolver;
use crate::conditions::SyncConditions;
use crate::config::BridgeConfig;
use crate::dispatcher::SyncRequestDispatcher;
use crate::error::Result;
use crate::executor::{AffinityExecutor, DesignatedThread};
use crate::scheduler::{RunnerScheduler, SyncWork};
use crate::watcher::CompletionWatcher;

/// A ready-to-use bridge.
///
/// Job observers may only be (de)registered on the designated thread this
/// bridge starts; jobs run on `runtime`.
pub struct SyncBridge {
    designated: Arc<DesignatedThread>,
    runner: Arc<JobRunner>,
    dispatcher: SyncRequestDispatcher,
}

impl SyncBridge {
    pub fn start(
        config: &BridgeConfig,
        runtime: Handle,
        accounts: Arc<dyn AccountResolver>,
        conditions: Arc<dyn SyncConditions>,
        work: Arc<dyn SyncWork>,
    ) -> Result<Self> {
        let designated = Arc::new(DesignatedThread::spawn(config.designated_thread_name.clone())?);
        let executor: Arc<dyn AffinityExecutor> = designated.clone();
        let runner = Arc::new(restrict_observers(JobRunner::new(runtime), executor.as_ref()));
        let scheduler = Arc::new(RunnerScheduler::new(Arc::clone(&runner), work));
        let watcher = CompletionWatcher::new(executor);
        let dispatcher = SyncRequestDispatcher::new(accounts, conditions, scheduler, watcher, config);

        tracing::debug!(
            thread = %config.designated_thread_name,
            wait_timeout_secs = config.wait_timeout.as_secs_f64(),
            "sync bridge started"
        );
        Ok(Self {
            designated,
            runner,
            dispatcher,
        })
    }

    pub fn dispatcher(&self) -> &SyncRequestDispatcher {
        &self.dispatcher
    }

    pub fn runner(&self) -> &Arc<JobRunner> {
        &self.runner
    }

    pub fn designated_thread(&self) -> &Arc<DesignatedThread> {
        &self.designated
    }
}

/// Jobs from `runner` only accept observers on the executor's thread, if it has one.
fn restrict_observers(runner: JobRunner, executor: &dyn AffinityExecutor) -> JobRunner {
    match executor.designated_thread_id() {
        Some(thread) => runner.with_observer_thread(thread),
        None => runner,
    }
}
