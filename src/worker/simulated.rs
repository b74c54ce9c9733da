//! Simulated print worker.
//!
//! Renders a document page by page on its own task thread and reports
//! progress through the job's notifier. Stands in for a real device backend
//! in the demo binary and in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{JobNotifier, JobWorker};
use crate::context::{TaskRunner, TaskThread, ThreadExit};
use crate::document::{PrintedDocument, PrintedPage};
use crate::error::ContextError;
use crate::events::JobEventKind;

/// Behavior knobs for `SimulatedWorker`.
#[derive(Debug, Clone, Default)]
pub struct WorkerOptions {
    /// Time spent rendering each page.
    pub page_delay: Duration,
    /// Report a device failure when this page is reached.
    pub fail_on_page: Option<u32>,
}

/// Worker that renders pages on a dedicated thread.
pub struct SimulatedWorker {
    thread: TaskThread,
    options: WorkerOptions,
    notifier: Mutex<Option<JobNotifier>>,
    document: Mutex<Option<Arc<PrintedDocument>>>,
    canceled: AtomicBool,
    stopping: AtomicBool,
}

impl SimulatedWorker {
    /// Spawn the worker and its thread.
    pub fn spawn(thread_name: impl Into<String>, options: WorkerOptions) -> Result<Self, ContextError> {
        Ok(Self {
            thread: TaskThread::spawn(thread_name)?,
            options,
            notifier: Mutex::new(None),
            document: Mutex::new(None),
            canceled: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
        })
    }

    /// Bind the worker to the job that now owns it.
    pub(crate) fn set_notifier(&self, notifier: JobNotifier) {
        *self.notifier.lock().unwrap_or_else(PoisonError::into_inner) = Some(notifier);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Document the worker was last told about.
    pub fn document(&self) -> Option<Arc<PrintedDocument>> {
        self.document
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn should_abort(&self) -> bool {
        self.is_canceled() || self.stopping.load(Ordering::Acquire)
    }

    fn notify(
        &self,
        kind: JobEventKind,
        document: &Arc<PrintedDocument>,
        page: Option<Arc<PrintedPage>>,
    ) {
        let notifier = self
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match notifier {
            Some(notifier) => notifier.notify(kind, Some(Arc::clone(document)), page),
            None => warn!(kind = %kind, "Worker has no job to notify"),
        }
    }
}

impl JobWorker for SimulatedWorker {
    fn start_printing(&self, document: Option<Arc<PrintedDocument>>) {
        debug_assert!(self.thread.runner().runs_tasks_on_current_thread());

        let Some(document) = document.or_else(|| self.document()) else {
            warn!("Asked to print without a document");
            return;
        };
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&document));

        let page_count = document.page_count();
        info!(cookie = document.cookie(), page_count, "Worker started printing");

        for number in 1..=page_count {
            if self.should_abort() {
                info!(cookie = document.cookie(), page = number, "Worker abandoned document");
                return;
            }

            let page = Arc::new(PrintedPage::new(number));
            self.notify(JobEventKind::NewPage, &document, Some(Arc::clone(&page)));

            if self.options.fail_on_page == Some(number) {
                // Invalidate ourselves before reporting, the job will not cancel us again.
                self.canceled.store(true, Ordering::Release);
                warn!(cookie = document.cookie(), page = number, "Device failure while printing");
                self.notify(JobEventKind::Failed, &document, None);
                return;
            }

            if !self.options.page_delay.is_zero() {
                std::thread::sleep(self.options.page_delay);
            }
            if self.should_abort() {
                info!(cookie = document.cookie(), page = number, "Worker abandoned document");
                return;
            }

            document.set_page(Arc::clone(&page));
            self.notify(JobEventKind::PageDone, &document, Some(page));
        }

        self.notify(JobEventKind::AllPagesRequested, &document, None);
        self.notify(JobEventKind::DocumentDone, &document, None);
        info!(cookie = document.cookie(), "Worker finished document");
    }

    fn on_document_changed(&self, document: Option<Arc<PrintedDocument>>) {
        debug!(cookie = document.as_ref().map(|d| d.cookie()), "Worker document changed");
        *self.document.lock().unwrap_or_else(PoisonError::into_inner) = document;
    }

    fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
        info!("Worker canceled");
    }

    fn stop_soon(&self) {
        self.stopping.store(true, Ordering::Release);
        self.thread.stop_soon();
    }

    fn stop(&self) {
        self.stopping.store(true, Ordering::Release);
        self.thread.stop();
    }

    fn task_runner(&self) -> Option<TaskRunner> {
        self.thread.runner_if_running()
    }

    fn exit_signal(&self) -> Option<ThreadExit> {
        Some(self.thread.exit_signal())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{JobId, NotificationBus};
    use crate::settings::PrintSettings;

    fn drain(stream: &mut crate::events::JobEventStream) -> Vec<(JobEventKind, Option<u32>)> {
        std::iter::from_fn(|| stream.try_recv())
            .map(|e| (e.kind, e.page.map(|p| p.page_number())))
            .collect()
    }

    fn document(pages: u32) -> Arc<PrintedDocument> {
        let doc = Arc::new(PrintedDocument::new(PrintSettings::default(), None, 11));
        doc.set_page_count(pages);
        doc
    }

    #[test]
    fn renders_every_page_then_reports_done() {
        let bus = NotificationBus::new(32);
        let id = JobId::new();
        let mut stream = bus.subscribe_to(id);
        let worker = Arc::new(SimulatedWorker::spawn("sim-render", WorkerOptions::default()).unwrap());
        worker.set_notifier(JobNotifier::new(id, Arc::clone(&bus)));

        let doc = document(2);
        let runner = worker.task_runner().unwrap();
        {
            let worker = Arc::clone(&worker);
            let doc = Arc::clone(&doc);
            runner.invoke(move || worker.start_printing(Some(doc))).unwrap();
        }

        assert!(doc.is_complete());
        assert_eq!(
            drain(&mut stream),
            vec![
                (JobEventKind::NewPage, Some(1)),
                (JobEventKind::PageDone, Some(1)),
                (JobEventKind::NewPage, Some(2)),
                (JobEventKind::PageDone, Some(2)),
                (JobEventKind::AllPagesRequested, None),
                (JobEventKind::DocumentDone, None),
            ]
        );
        worker.stop();
        assert!(worker.task_runner().is_none());
    }

    #[test]
    fn failing_page_reports_failed_and_stops() {
        let bus = NotificationBus::new(32);
        let id = JobId::new();
        let mut stream = bus.subscribe_to(id);
        let options = WorkerOptions {
            fail_on_page: Some(2),
            ..Default::default()
        };
        let worker = Arc::new(SimulatedWorker::spawn("sim-fail", options).unwrap());
        worker.set_notifier(JobNotifier::new(id, Arc::clone(&bus)));

        let doc = document(3);
        {
            let worker = Arc::clone(&worker);
            let doc = Arc::clone(&doc);
            worker
                .task_runner()
                .unwrap()
                .invoke(move || worker.start_printing(Some(doc)))
                .unwrap();
        }

        let kinds: Vec<_> = drain(&mut stream).into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds.last(), Some(&JobEventKind::Failed));
        assert!(!kinds.contains(&JobEventKind::DocumentDone));
        assert!(worker.is_canceled());
        assert_eq!(doc.rendered_pages(), 1);
        worker.stop();
    }

    #[test]
    fn canceled_worker_renders_nothing() {
        let bus = NotificationBus::new(8);
        let id = JobId::new();
        let mut stream = bus.subscribe_to(id);
        let worker = Arc::new(SimulatedWorker::spawn("sim-cancel", WorkerOptions::default()).unwrap());
        worker.set_notifier(JobNotifier::new(id, Arc::clone(&bus)));
        worker.cancel();

        let doc = document(2);
        {
            let worker = Arc::clone(&worker);
            let doc = Arc::clone(&doc);
            worker
                .task_runner()
                .unwrap()
                .invoke(move || worker.start_printing(Some(doc)))
                .unwrap();
        }
        assert!(drain(&mut stream).is_empty());
        assert_eq!(doc.rendered_pages(), 0);
        worker.stop();
    }

    #[test]
    fn document_change_is_remembered() {
        let worker = Arc::new(SimulatedWorker::spawn("sim-doc", WorkerOptions::default()).unwrap());
        let doc = document(1);
        {
            let worker = Arc::clone(&worker);
            let doc = Arc::clone(&doc);
            worker
                .task_runner()
                .unwrap()
                .invoke(move || worker.on_document_changed(Some(doc)))
                .unwrap();
        }
        assert!(worker.document().is_some_and(|d| Arc::ptr_eq(&d, &doc)));
        worker.stop_soon();
        assert!(worker.exit_signal().unwrap().wait_timeout(Duration::from_secs(5)));
        worker.stop();
    }
}
