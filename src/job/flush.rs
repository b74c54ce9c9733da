//! Completion signal for `PrintJob::flush_and_wait`.

use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct FlushState {
    generation: u64,
    waiters: usize,
}

/// Condition variable a caller blocks on until the job stops.
#[derive(Debug, Default)]
pub(crate) struct FlushSignal {
    state: Mutex<FlushState>,
    cond: Condvar,
}

impl FlushSignal {
    /// Block until the next `signal` or until `timeout` elapses.
    /// Returns `true` if signaled.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let generation = state.generation;
        state.waiters += 1;
        let (mut state, result) = self
            .cond
            .wait_timeout_while(state, timeout, |s| s.generation == generation)
            .unwrap_or_else(PoisonError::into_inner);
        state.waiters -= 1;
        !result.timed_out()
    }

    /// Wake every waiter. Returns how many were waiting.
    pub(crate) fn signal(&self) -> usize {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation = state.generation.wrapping_add(1);
        self.cond.notify_all();
        state.waiters
    }
}
