//! Worker side of a print job.
//!
//! Core components:
//! - `JobWorker`: what the job needs from a worker: blocking operations run
//!   on the worker's own execution context, plus liveness and teardown hooks
//! - `WorkerOwner`: factory that hands its worker to a job exactly once
//! - `JobNotifier`: handle a worker uses to publish events for its job
//! - `simulated`: `SimulatedWorker`, renders pages on a dedicated thread
//! - `query`: `PrinterQuery`, the owner that prepares a worker and settings

pub mod query;
pub mod simulated;

use std::sync::Arc;

use crate::context::{TaskRunner, ThreadExit};
use crate::document::{PrintedDocument, PrintedPage};
use crate::events::{JobEvent, JobEventKind, JobId, NotificationBus};
use crate::settings::PrintSettings;

pub use query::PrinterQuery;
pub use simulated::{SimulatedWorker, WorkerOptions};

/// Worker driven by a print job.
///
/// `start_printing` and `on_document_changed` are posted to the worker's
/// context. `cancel` and `stop_soon` are called in place from the
/// coordinating context and must not block. `stop` blocks and is run on the
/// blocking pool.
pub trait JobWorker: Send + Sync {
    /// Render and spool `document`. Runs on the worker context.
    fn start_printing(&self, document: Option<Arc<PrintedDocument>>);

    /// The job swapped its document. Runs on the worker context.
    fn on_document_changed(&self, document: Option<Arc<PrintedDocument>>);

    /// Invalidate in-flight work immediately.
    fn cancel(&self);

    /// Ask the worker context to terminate without draining queued tasks.
    fn stop_soon(&self);

    /// Tear down the worker context, blocking until it is gone.
    fn stop(&self);

    /// Runner of the worker context while it is alive.
    fn task_runner(&self) -> Option<TaskRunner>;

    /// Termination signal of the worker context, for the restricted
    /// shutdown wait.
    fn exit_signal(&self) -> Option<ThreadExit>;
}

/// Holder of a prepared worker and its settings.
pub trait WorkerOwner {
    /// Transfer the worker to the job identified by `notifier`. Returns
    /// `None` once the worker has already been handed off.
    fn detach_worker(&mut self, notifier: JobNotifier) -> Option<Arc<dyn JobWorker>>;

    fn settings(&self) -> PrintSettings;

    fn cookie(&self) -> i32;
}

/// Publishes events on behalf of one job.
#[derive(Debug, Clone)]
pub struct JobNotifier {
    job_id: JobId,
    bus: Arc<NotificationBus>,
}

impl JobNotifier {
    pub fn new(job_id: JobId, bus: Arc<NotificationBus>) -> Self {
        Self { job_id, bus }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub fn notify(
        &self,
        kind: JobEventKind,
        document: Option<Arc<PrintedDocument>>,
        page: Option<Arc<PrintedPage>>,
    ) {
        self.bus.publish(
            JobEvent::new(kind, self.job_id)
                .with_document(document)
                .with_page(page),
        );
    }
}
