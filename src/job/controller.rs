//! Print job controller.
//!
//! A `PrintJob` owns one worker and drives it from the coordinating context.
//! Work is posted to the worker's own context; progress comes back as
//! events the job observes on the coordinating context. Every posted task
//! and every event delivery holds an `Arc<PrintJob>`, so the job outlives
//! anything in flight that refers to it.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::flush::FlushSignal;
use super::shutdown::{self, ShutdownHazard};
use super::state::{JobFlags, JobStatus};
use crate::context::{TaskRunner, ThreadExit};
use crate::document::{PagesSource, PrintedDocument, PrintedPage};
use crate::events::{JobEvent, JobEventKind, JobEventObserver, JobId, NotificationBus, Registration};
use crate::settings::PrintSettings;
use crate::worker::{JobNotifier, JobWorker, WorkerOwner};

#[derive(Default)]
struct JobInner {
    source: Option<Arc<dyn PagesSource>>,
    worker: Option<Arc<dyn JobWorker>>,
    document: Option<Arc<PrintedDocument>>,
    settings: PrintSettings,
    flags: JobFlags,
    initialized: bool,
    registration: Option<Registration>,
}

impl JobInner {
    /// The worker, if its execution context is still alive and teardown has
    /// not begun.
    fn live_worker(&self) -> Option<(Arc<dyn JobWorker>, TaskRunner)> {
        if self.flags.stopping || self.flags.stopped {
            return None;
        }
        let worker = self.worker.as_ref()?;
        let runner = worker.task_runner()?;
        Some((Arc::clone(worker), runner))
    }
}

/// One print job, driven from the coordinating context.
///
/// Mutating operations panic when called from any other thread. Queries may
/// be called from anywhere.
pub struct PrintJob {
    id: JobId,
    coordinator: TaskRunner,
    bus: Arc<NotificationBus>,
    hazard: Arc<dyn ShutdownHazard>,
    flush: FlushSignal,
    /// Latched once the worker context has been joined.
    torn_down: ThreadExit,
    inner: Mutex<JobInner>,
}

impl PrintJob {
    /// Create a job coordinated by `coordinator`, using the platform's
    /// shutdown hazard strategy.
    pub fn new(coordinator: TaskRunner, bus: Arc<NotificationBus>) -> Arc<Self> {
        Self::with_hazard(coordinator, bus, shutdown::platform_default())
    }

    pub fn with_hazard(
        coordinator: TaskRunner,
        bus: Arc<NotificationBus>,
        hazard: Arc<dyn ShutdownHazard>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: JobId::new(),
            coordinator,
            bus,
            hazard,
            flush: FlushSignal::default(),
            torn_down: ThreadExit::new(),
            inner: Mutex::new(JobInner::default()),
        })
    }

    fn state(&self) -> MutexGuard<'_, JobInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn assert_on_coordinator(&self, operation: &str) {
        assert!(
            self.coordinator.runs_tasks_on_current_thread(),
            "PrintJob::{operation} must run on the coordinating context ({})",
            self.coordinator.name()
        );
    }

    /// Take the worker from `owner` and build the first document.
    ///
    /// # Panics
    ///
    /// If the job was already initialized, if a job is pending, or if the
    /// owner has no worker left to hand off.
    pub fn initialize(
        self: &Arc<Self>,
        owner: &mut dyn WorkerOwner,
        source: Arc<dyn PagesSource>,
        page_count: u32,
    ) {
        self.assert_on_coordinator("initialize");
        let (initialized, flags) = {
            let inner = self.state();
            (inner.initialized, inner.flags)
        };
        assert!(!initialized, "print job {} is already initialized", self.id);
        assert!(
            !flags.pending && !flags.canceling,
            "print job {} cannot be initialized while {}",
            self.id,
            flags.status()
        );

        let notifier = JobNotifier::new(self.id, Arc::clone(&self.bus));
        let Some(worker) = owner.detach_worker(notifier) else {
            panic!("worker owner for print job {} has no worker to hand off", self.id);
        };
        let settings = owner.settings();
        {
            let mut inner = self.state();
            inner.initialized = true;
            inner.source = Some(Arc::clone(&source));
            inner.worker = Some(worker);
            inner.settings = settings.clone();
        }

        let document = Arc::new(PrintedDocument::new(settings, Some(source), owner.cookie()));
        document.set_page_count(page_count);
        self.update_document(Some(document));

        // Register for our own events.
        let observer: Weak<dyn JobEventObserver> = Arc::downgrade(self) as Weak<dyn JobEventObserver>;
        let registration = self
            .bus
            .register(self.id, self.coordinator.clone(), observer);
        self.state().registration = Some(registration);

        info!(job_id = %self.id, cookie = owner.cookie(), page_count, "Print job initialized");
    }

    /// Dispatch the job to the worker.
    ///
    /// No-op if a job is already pending or the worker context is gone.
    /// `NewDocument` is published before the worker task is known to have run.
    pub fn start_printing(self: &Arc<Self>) {
        self.assert_on_coordinator("start_printing");
        let (worker, runner, document) = {
            let inner = self.state();
            if inner.flags.pending {
                warn!(job_id = %self.id, "Print job already pending, ignoring start");
                return;
            }
            let Some((worker, runner)) = inner.live_worker() else {
                warn!(job_id = %self.id, "No live worker context, ignoring start");
                return;
            };
            (worker, runner, inner.document.clone())
        };

        let job = Arc::clone(self);
        let task_document = document.clone();
        let posted = runner.post(move || {
            let _job = job;
            worker.start_printing(task_document);
        });
        if !posted {
            warn!(job_id = %self.id, "Worker context exited before the job could start");
            return;
        }

        self.state().flags.pending = true;
        info!(job_id = %self.id, cookie = self.cookie(), "Print job started");

        self.publish(JobEventKind::NewDocument, document, None);
    }

    /// Cancel the job. Safe to re-enter: nested calls return immediately.
    pub fn cancel(self: &Arc<Self>) {
        self.assert_on_coordinator("cancel");
        let worker = {
            let mut inner = self.state();
            if inner.flags.canceling {
                debug!(job_id = %self.id, "Cancel already in progress");
                return;
            }
            inner.flags.canceling = true;
            inner.live_worker().map(|(worker, _)| worker)
        };

        // Be sure to live long enough.
        let _job = Arc::clone(self);
        info!(job_id = %self.id, "Canceling print job");

        if let Some(worker) = worker {
            // In place rather than posted, so the job is invalid before any
            // queued worker task gets to run.
            worker.cancel();
        }

        self.publish(JobEventKind::Failed, None, None);
        self.stop();

        self.state().flags.canceling = false;
    }

    /// Stop the job and tear down the worker. Idempotent.
    pub fn stop(self: &Arc<Self>) {
        self.assert_on_coordinator("stop");

        let waiters = self.flush.signal();
        if waiters > 0 {
            debug!(job_id = %self.id, waiters, "Released flush waiters");
        }

        // Be sure to live long enough.
        let _job = Arc::clone(self);

        let worker = self.state().live_worker().map(|(worker, _)| worker);
        if let Some(worker) = worker {
            self.controlled_worker_shutdown(worker);
        }

        let registration = {
            let mut inner = self.state();
            inner.flags.pending = false;
            inner.registration.take()
        };
        drop(registration);

        self.update_document(None);
    }

    /// Replace the document. No-op if `new_document` is the current one.
    ///
    /// # Panics
    ///
    /// If a job is pending on a live worker.
    pub fn update_document(self: &Arc<Self>, new_document: Option<Arc<PrintedDocument>>) {
        self.assert_on_coordinator("update_document");
        let live = {
            let mut inner = self.state();
            let unchanged = match (&inner.document, &new_document) {
                (Some(current), Some(new)) => Arc::ptr_eq(current, new),
                (None, None) => true,
                _ => false,
            };
            if unchanged {
                return;
            }

            let live = inner.live_worker();
            let pending = inner.flags.pending;
            if live.is_some() && pending {
                drop(inner);
                panic!(
                    "print job {} cannot swap its document while a job is pending",
                    self.id
                );
            }

            inner.document = new_document.clone();
            if let Some(document) = &new_document {
                inner.settings = document.settings().clone();
            }
            live
        };

        if let Some((worker, runner)) = live {
            // Sync the document with the worker.
            let job = Arc::clone(self);
            runner.post(move || {
                let _job = job;
                worker.on_document_changed(new_document);
            });
        }
    }

    /// Block the calling thread until the job stops or `timeout` elapses.
    /// Returns `true` if the job stopped.
    ///
    /// # Panics
    ///
    /// When called on the coordinating context, which has to run `stop`.
    pub fn flush_and_wait(self: &Arc<Self>, timeout: Duration) -> bool {
        assert!(
            !self.coordinator.runs_tasks_on_current_thread(),
            "flush_and_wait() would block the coordinating context of print job {}",
            self.id
        );
        // Make sure the job outlives the wait.
        let _job = Arc::clone(self);

        let finished = self.flush.wait(timeout);
        debug!(job_id = %self.id, finished, ?timeout, "Flush wait ended");
        finished
    }

    /// Block the calling thread until the worker context has been torn down
    /// or `timeout` elapses. Returns `true` once teardown has completed,
    /// including when it completed before the call.
    ///
    /// # Panics
    ///
    /// When called on the coordinating context, which runs the teardown reply.
    pub fn wait_for_teardown(&self, timeout: Duration) -> bool {
        assert!(
            !self.coordinator.runs_tasks_on_current_thread(),
            "wait_for_teardown() would block the coordinating context of print job {}",
            self.id
        );
        self.torn_down.wait_timeout(timeout)
    }

    /// Forget the pages source. Rendered pages are kept.
    pub fn disconnect_source(&self) {
        self.assert_on_coordinator("disconnect_source");
        let document = {
            let mut inner = self.state();
            inner.source = None;
            inner.document.clone()
        };
        if let Some(document) = document {
            document.disconnect_source();
        }
    }

    fn on_document_done(self: Arc<Self>) {
        // `self` keeps the job alive: the JobDone broadcast may release the
        // last outside reference.
        let document = self.document();
        self.stop();

        info!(job_id = %self.id, "Print job done");
        self.publish(JobEventKind::JobDone, document, None);
    }

    fn controlled_worker_shutdown(self: &Arc<Self>, worker: Arc<dyn JobWorker>) {
        self.assert_on_coordinator("controlled_worker_shutdown");
        worker.stop_soon();

        if self.hazard.applies() {
            if let Some(exit) = worker.exit_signal() {
                debug!(job_id = %self.id, "Waiting for worker context to exit");
                self.hazard.restricted_wait(&exit);
            }
        }

        // Joining may block, keep it off the coordinating context.
        self.state().flags.stopping = true;
        let job = Arc::clone(self);
        self.coordinator
            .post_task_and_reply(move || worker.stop(), move || job.hold_until_stop_is_called());
    }

    fn hold_until_stop_is_called(&self) {
        let worker = {
            let mut inner = self.state();
            inner.flags.stopped = true;
            inner.flags.stopping = false;
            inner.worker.take_if(|worker| worker.task_runner().is_none())
        };
        drop(worker);
        self.torn_down.signal();
        info!(job_id = %self.id, "Print job worker torn down");
    }

    fn publish(
        &self,
        kind: JobEventKind,
        document: Option<Arc<PrintedDocument>>,
        page: Option<Arc<PrintedPage>>,
    ) {
        self.bus.publish(
            JobEvent::new(kind, self.id)
                .with_document(document)
                .with_page(page),
        );
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    /// Runner of the coordinating context.
    pub fn coordinator(&self) -> &TaskRunner {
        &self.coordinator
    }

    pub fn is_job_pending(&self) -> bool {
        self.state().flags.pending
    }

    pub fn is_canceling(&self) -> bool {
        self.state().flags.canceling
    }

    pub fn is_stopping(&self) -> bool {
        self.state().flags.stopping
    }

    pub fn is_stopped(&self) -> bool {
        self.state().flags.stopped
    }

    pub fn flags(&self) -> JobFlags {
        self.state().flags
    }

    pub fn status(&self) -> JobStatus {
        self.state().flags.status()
    }

    pub fn document(&self) -> Option<Arc<PrintedDocument>> {
        self.state().document.clone()
    }

    /// Cookie of the current document, `0` when there is none.
    pub fn cookie(&self) -> i32 {
        self.state()
            .document
            .as_ref()
            .map_or(0, |document| document.cookie())
    }

    pub fn settings(&self) -> PrintSettings {
        self.state().settings.clone()
    }

    /// Whether the job still holds its worker.
    pub fn has_worker(&self) -> bool {
        self.state().worker.is_some()
    }
}

impl JobEventObserver for PrintJob {
    fn on_job_event(self: Arc<Self>, event: &JobEvent) {
        self.assert_on_coordinator("on_job_event");
        assert_eq!(
            event.source, self.id,
            "print job received an event published by another job"
        );
        debug!(job_id = %self.id, kind = %event.kind, "Handling print job event");

        match event.kind {
            JobEventKind::Failed => {
                self.state().settings.clear();
                // No need to cancel, the worker already invalidated itself.
                self.stop();
            }
            JobEventKind::UserInitDone
            | JobEventKind::DefaultInitDone
            | JobEventKind::UserInitCanceled => {
                let document = self.document();
                assert!(
                    event.is_for_document(document.as_ref()),
                    "settings event for a document print job {} no longer holds",
                    self.id
                );
            }
            JobEventKind::NewDocument
            | JobEventKind::NewPage
            | JobEventKind::PageDone
            | JobEventKind::AllPagesRequested
            | JobEventKind::JobDone => {}
            JobEventKind::DocumentDone => {
                // Completion may drop the job, so never run it inside a delivery.
                let job = Arc::clone(&self);
                self.coordinator.post(move || job.on_document_done());
            }
        }
    }
}

// Runs on whichever thread releases the last reference, including a worker
// thread discarding its queue on exit. Only owned state is inspected.
impl Drop for PrintJob {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        // The job must be finished, or at least canceled, before it goes away.
        assert!(
            !inner.flags.pending,
            "print job {} destroyed while a job is pending",
            self.id
        );
        assert!(
            !inner.flags.canceling,
            "print job {} destroyed while canceling",
            self.id
        );
        if let Some(worker) = &inner.worker {
            assert!(
                worker.task_runner().is_none(),
                "print job {} destroyed before its worker context was torn down",
                self.id
            );
        }
    }
}

impl fmt::Debug for PrintJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.state();
        f.debug_struct("PrintJob")
            .field("id", &self.id)
            .field("coordinator", &self.coordinator.name())
            .field("status", &inner.flags.status())
            .field("cookie", &inner.document.as_ref().map(|d| d.cookie()))
            .field("has_worker", &inner.worker.is_some())
            .finish()
    }
}
