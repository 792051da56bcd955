// crates/bridge/src/interrupt.rs
//! Interrupting a caller blocked in a bridge wait.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::watcher::WaitContext;

#[derive(Default)]
struct InterruptState {
    pending: bool,
    waiter: Option<Arc<WaitContext>>,
}

/// Interrupt flag for one calling thread.
///
/// Clones share the flag. [`Interrupt::interrupt`] wakes a wait in progress;
/// if no wait is in progress the flag stays set and the next wait ends
/// immediately. A wait that ends because of the interrupt clears the flag.
/// Interrupting never affects the job being waited on.
#[derive(Clone, Default)]
pub struct Interrupt {
    inner: Arc<Mutex<InterruptState>>,
}

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interrupt(&self) {
        let waiter = {
            let mut state = self.state();
            state.pending = true;
            state.waiter.clone()
        };
        if let Some(waiter) = waiter {
            waiter.interrupt();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.state().pending
    }

    /// Attach `ctx` as the current waiter. Returns true if an interrupt is
    /// already pending.
    pub(crate) fn arm(&self, ctx: &Arc<WaitContext>) -> bool {
        let mut state = self.state();
        state.waiter = Some(Arc::clone(ctx));
        state.pending
    }

    /// Detach the waiter; `consumed` clears the flag.
    pub(crate) fn disarm(&self, consumed: bool) {
        let mut state = self.state();
        state.waiter = None;
        if consumed {
            state.pending = false;
        }
    }

    fn state(&self) -> MutexGuard<'_, InterruptState> {
        self.inner.lock().unwrap_or_else(|poisoned| {
            tracing::error!("interrupt lock poisoned");
            poisoned.into_inner()
        })
    }
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupt")
            .field("pending", &self.is_interrupted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_shared_between_clones() {
        let interrupt = Interrupt::new();
        let other = interrupt.clone();
        assert!(!interrupt.is_interrupted());

        other.interrupt();
        assert!(interrupt.is_interrupted());
        interrupt.disarm(true);
        assert!(!other.is_interrupted());
    }

    #[test]
    fn test_arm_reports_pending_interrupt() {
        let interrupt = Interrupt::new();
        let ctx = Arc::new(WaitContext::new());
        assert!(!interrupt.arm(&ctx));
        interrupt.disarm(false);

        interrupt.interrupt();
        assert!(interrupt.arm(&ctx));
        interrupt.disarm(true);
        assert!(!interrupt.is_interrupted());
    }
}
