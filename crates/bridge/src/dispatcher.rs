// crates/bridge/src/dispatcher.rs
//! Synchronous entry point called by the legacy sync framework.

use std::sync::Arc;
use std::time::Duration;

use crate::account::{AccountRef, AccountResolver};
use crate::conditions::SyncConditions;
use crate::config::BridgeConfig;
use crate::interrupt::Interrupt;
use crate::scheduler::{job_name_for, SyncJobParams, SyncJobScheduler};
use crate::watcher::CompletionWatcher;

/// One sync request from the framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub account: AccountRef,
    /// Data category to sync (contacts, calendars, tasks, ...).
    pub authority: String,
    pub upload: bool,
}

/// Turns a blocking sync request into an enqueue-or-join plus a bounded wait.
///
/// [`handle`](Self::handle) always returns; every failure is logged and
/// swallowed. Must be called from a plain thread, not from inside an async
/// runtime.
pub struct SyncRequestDispatcher {
    accounts: Arc<dyn AccountResolver>,
    conditions: Arc<dyn SyncConditions>,
    scheduler: Arc<dyn SyncJobScheduler>,
    watcher: CompletionWatcher,
    wait_timeout: Duration,
}

impl SyncRequestDispatcher {
    pub fn new(
        accounts: Arc<dyn AccountResolver>,
        conditions: Arc<dyn SyncConditions>,
        scheduler: Arc<dyn SyncJobScheduler>,
        watcher: CompletionWatcher,
        config: &BridgeConfig,
    ) -> Self {
        Self {
            accounts,
            conditions,
            scheduler,
            watcher,
            wait_timeout: config.wait_timeout,
        }
    }

    pub fn handle(&self, request: &SyncRequest) {
        self.handle_interruptible(request, &Interrupt::new());
    }

    /// Handle `request`; firing `interrupt` ends the wait early.
    pub fn handle_interruptible(&self, request: &SyncRequest, interrupt: &Interrupt) {
        tracing::info!(
            account = %request.account,
            authority = %request.authority,
            upload = request.upload,
            "Sync request via sync framework"
        );

        let ctx = match self.accounts.resolve(&request.account) {
            Ok(ctx) => ctx,
            Err(e) => {
                tracing::warn!(account = %request.account, error = %e, "Account doesn't exist anymore");
                return;
            }
        };

        if !self.conditions.conditions_met(&ctx) {
            tracing::info!(account = %request.account, "Sync conditions not met, dropping request");
            return;
        }

        let job_name = job_name_for(&request.account, &request.authority);
        let params = SyncJobParams {
            account: request.account.clone(),
            authority: request.authority.clone(),
            upload: request.upload,
        };
        let handle = match self.scheduler.enqueue_or_join(&job_name, params) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(job = %job_name, error = %e, "Could not start sync job");
                return;
            }
        };

        tracing::debug!(job = %job_name, timeout_secs = self.wait_timeout.as_secs_f64(), "Blocking caller until sync job finishes");
        let outcome = self
            .watcher
            .wait_for_terminal_interruptible(&handle, self.wait_timeout, interrupt);

        tracing::info!(job = %job_name, outcome = ?outcome, "Returning to sync framework");
    }

    /// The framework reported a security exception for this account.
    pub fn on_security_exception(&self, account: &AccountRef, authority: &str) {
        tracing::warn!(%account, authority, "Security exception for sync request");
    }

    /// The framework cancelled the sync running on the thread behind
    /// `interrupt`. The job is left alone; only the wait ends.
    pub fn on_sync_canceled(&self, interrupt: &Interrupt) {
        tracing::info!("Sync framework cancelled the request, sync job keeps running");
        interrupt.interrupt();
    }
}
