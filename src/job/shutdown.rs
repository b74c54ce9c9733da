//! Worker teardown hazard.
//!
//! On some platforms a worker blocked inside a native call can only make
//! progress while the coordinating context keeps servicing inbound signals.
//! Joining such a worker from a context that has stopped servicing them
//! deadlocks. A `ShutdownHazard` decides whether the controller must first
//! wait for the worker to exit in a restricted loop that services only that
//! signaling, without running queued tasks or timers.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::context::ThreadExit;

/// Platform strategy for the extra step of worker shutdown.
pub trait ShutdownHazard: Send + Sync + fmt::Debug {
    /// Whether the restricted wait is needed.
    fn applies(&self) -> bool;

    /// Block until `exit` is signaled, servicing only what the worker needs
    /// to unblock.
    fn restricted_wait(&self, exit: &ThreadExit);
}

/// Platforms without the hazard.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHazard;

impl ShutdownHazard for NoHazard {
    fn applies(&self) -> bool {
        false
    }

    fn restricted_wait(&self, _exit: &ThreadExit) {}
}

type Pump = Box<dyn Fn() + Send + Sync>;

/// Waits for the worker context to exit, calling `pump` between polls.
pub struct RestrictedWait {
    poll_interval: Duration,
    pump: Option<Pump>,
}

impl RestrictedWait {
    pub fn new() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            pump: None,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Hook that services inbound signaling while waiting.
    pub fn with_pump<F>(mut self, pump: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.pump = Some(Box::new(pump));
        self
    }
}

impl Default for RestrictedWait {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHazard for RestrictedWait {
    fn applies(&self) -> bool {
        true
    }

    fn restricted_wait(&self, exit: &ThreadExit) {
        let Some(pump) = &self.pump else {
            exit.wait();
            debug!("Worker context exited during restricted wait");
            return;
        };
        let mut polls = 0u64;
        while !exit.wait_timeout(self.poll_interval) {
            polls += 1;
            pump();
        }
        debug!(polls, "Worker context exited during restricted wait");
    }
}

impl fmt::Debug for RestrictedWait {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestrictedWait")
            .field("poll_interval", &self.poll_interval)
            .field("pump", &self.pump.is_some())
            .finish()
    }
}

/// The hazard strategy for the platform this was built for.
pub fn platform_default() -> Arc<dyn ShutdownHazard> {
    if cfg!(windows) {
        Arc::new(RestrictedWait::new())
    } else {
        Arc::new(NoHazard)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn no_hazard_returns_immediately() {
        let exit = ThreadExit::new();
        assert!(!NoHazard.applies());
        NoHazard.restricted_wait(&exit);
        assert!(!exit.is_signaled());
    }

    #[test]
    fn restricted_wait_pumps_until_exit() {
        let pumped = Arc::new(AtomicUsize::new(0));
        let exit = ThreadExit::new();
        let hazard = {
            let pumped = Arc::clone(&pumped);
            let exit = exit.clone();
            RestrictedWait::new()
                .with_poll_interval(Duration::from_millis(1))
                .with_pump(move || {
                    if pumped.fetch_add(1, Ordering::SeqCst) == 3 {
                        exit.signal();
                    }
                })
        };
        assert!(hazard.applies());
        hazard.restricted_wait(&exit);
        assert!(exit.is_signaled());
        assert!(pumped.load(Ordering::SeqCst) >= 4);
    }

    #[test]
    fn restricted_wait_without_pump_blocks_until_exit() {
        let exit = ThreadExit::new();
        let guard = exit.signal_on_drop();
        let waiter = {
            let exit = exit.clone();
            std::thread::spawn(move || RestrictedWait::new().restricted_wait(&exit))
        };
        std::thread::sleep(Duration::from_millis(20));
        assert!(!waiter.is_finished());
        drop(guard);
        waiter.join().unwrap();
        assert!(exit.is_signaled());
    }

    #[test]
    fn platform_default_matches_target() {
        assert_eq!(platform_default().applies(), cfg!(windows));
    }
}
