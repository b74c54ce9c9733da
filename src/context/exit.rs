//! Thread termination signal.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct ExitState {
    exited: Mutex<bool>,
    cond: Condvar,
}

/// One-shot signal raised when a task thread leaves its run loop.
///
/// Cloning shares the same signal. This is the handle the restricted
/// shutdown wait blocks on.
#[derive(Debug, Clone, Default)]
pub struct ThreadExit {
    state: Arc<ExitState>,
}

impl ThreadExit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the thread has exited.
    pub fn is_signaled(&self) -> bool {
        *self
            .state
            .exited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until the thread has exited.
    pub fn wait(&self) {
        let exited = self
            .state
            .exited
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let _exited = self
            .state
            .cond
            .wait_while(exited, |exited| !*exited)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the thread has exited or `timeout` elapses.
    /// Returns `true` if the thread exited.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let exited = self
            .state
            .exited
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (_exited, result) = self
            .state
            .cond
            .wait_timeout_while(exited, timeout, |exited| !*exited)
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    pub(crate) fn signal(&self) {
        let mut exited = self
            .state
            .exited
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *exited = true;
        self.state.cond.notify_all();
    }

    /// Guard that raises the signal when dropped, including during unwinding.
    pub(crate) fn signal_on_drop(&self) -> ExitGuard {
        ExitGuard(self.clone())
    }
}

pub(crate) struct ExitGuard(ThreadExit);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.signal();
    }
}
