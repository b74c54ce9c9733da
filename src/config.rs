//! Configuration types.

use std::sync::Arc;
use std::time::Duration;

use crate::job::shutdown::{NoHazard, RestrictedWait, ShutdownHazard};

/// Print job configuration.
#[derive(Debug, Clone)]
pub struct PrintJobConfig {
    /// Name of the coordinating context thread.
    pub coordinator_thread_name: String,
    /// Name of the worker context thread.
    pub worker_thread_name: String,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
    /// Default bound for `flush_and_wait`.
    pub flush_timeout: Duration,
    /// Whether worker shutdown runs the restricted wait before teardown.
    pub restricted_wait: bool,
    /// How often the restricted wait services its pump.
    pub restricted_wait_poll: Duration,
    /// Printer the demo job is sent to.
    pub device_name: String,
    /// Pages to render in the demo job.
    pub pages: u32,
    /// Simulated render time per page.
    pub page_delay: Duration,
    /// Cancel the demo job after this long, if set.
    pub cancel_after: Option<Duration>,
}

impl Default for PrintJobConfig {
    fn default() -> Self {
        Self {
            coordinator_thread_name: "print-coordinator".to_string(),
            worker_thread_name: "print-worker".to_string(),
            event_capacity: 256,
            flush_timeout: Duration::from_secs(30),
            // The deadlock only exists with window messaging on Windows.
            restricted_wait: cfg!(windows),
            restricted_wait_poll: Duration::from_millis(10),
            device_name: "Simulated Printer".to_string(),
            pages: 3,
            page_delay: Duration::from_millis(100),
            cancel_after: None,
        }
    }
}

impl PrintJobConfig {
    /// Build config from `PRINT_JOB_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup. Unset or unparsable values
    /// fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let millis = |key: &str| -> Option<Duration> {
            let raw = lookup(key)?;
            match raw.trim().parse::<u64>() {
                Ok(ms) => Some(Duration::from_millis(ms)),
                Err(_) => {
                    tracing::warn!(key, value = %raw, "Ignoring invalid duration");
                    None
                }
            }
        };

        let restricted_wait = match lookup("PRINT_JOB_RESTRICTED_WAIT").as_deref() {
            Some("1") | Some("true") | Some("yes") => true,
            Some("0") | Some("false") | Some("no") => false,
            _ => defaults.restricted_wait,
        };

        Self {
            coordinator_thread_name: lookup("PRINT_JOB_COORDINATOR_THREAD")
                .unwrap_or(defaults.coordinator_thread_name),
            worker_thread_name: lookup("PRINT_JOB_WORKER_THREAD")
                .unwrap_or(defaults.worker_thread_name),
            event_capacity: lookup("PRINT_JOB_EVENT_CAPACITY")
                .and_then(|s| s.trim().parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.event_capacity),
            flush_timeout: millis("PRINT_JOB_FLUSH_TIMEOUT_MS").unwrap_or(defaults.flush_timeout),
            restricted_wait,
            restricted_wait_poll: millis("PRINT_JOB_RESTRICTED_WAIT_POLL_MS")
                .unwrap_or(defaults.restricted_wait_poll),
            device_name: lookup("PRINT_JOB_DEVICE").unwrap_or(defaults.device_name),
            pages: lookup("PRINT_JOB_PAGES")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.pages),
            page_delay: millis("PRINT_JOB_PAGE_DELAY_MS").unwrap_or(defaults.page_delay),
            cancel_after: millis("PRINT_JOB_CANCEL_AFTER_MS"),
        }
    }

    /// Shutdown hazard strategy matching this configuration.
    pub fn shutdown_hazard(&self) -> Arc<dyn ShutdownHazard> {
        if self.restricted_wait {
            Arc::new(RestrictedWait::new().with_poll_interval(self.restricted_wait_poll))
        } else {
            Arc::new(NoHazard)
        }
    }
}
