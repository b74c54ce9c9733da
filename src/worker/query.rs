//! Printer query: owner of a worker until a job takes it.

use std::sync::Arc;

use tracing::debug;

use super::{JobNotifier, JobWorker, SimulatedWorker, WorkerOptions, WorkerOwner};
use crate::error::Result;
use crate::settings::PrintSettings;

/// Prepared worker plus the settings and cookie it was set up with.
pub struct PrinterQuery {
    worker: Option<SimulatedWorker>,
    settings: PrintSettings,
    cookie: i32,
}

impl PrinterQuery {
    pub fn new(worker: SimulatedWorker, settings: PrintSettings, cookie: i32) -> Self {
        Self {
            worker: Some(worker),
            settings,
            cookie,
        }
    }

    /// Spawn a `SimulatedWorker` on `thread_name` and wrap it.
    pub fn spawn(
        thread_name: impl Into<String>,
        options: WorkerOptions,
        settings: PrintSettings,
        cookie: i32,
    ) -> Result<Self> {
        let worker = SimulatedWorker::spawn(thread_name, options)?;
        Ok(Self::new(worker, settings, cookie))
    }

    /// Whether the worker is still here to hand off.
    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }
}

impl WorkerOwner for PrinterQuery {
    fn detach_worker(&mut self, notifier: JobNotifier) -> Option<Arc<dyn JobWorker>> {
        let worker = self.worker.take()?;
        debug!(job_id = %notifier.job_id(), cookie = self.cookie, "Worker detached from printer query");
        worker.set_notifier(notifier);
        Some(Arc::new(worker) as Arc<dyn JobWorker>)
    }

    fn settings(&self) -> PrintSettings {
        self.settings.clone()
    }

    fn cookie(&self) -> i32 {
        self.cookie
    }
}
