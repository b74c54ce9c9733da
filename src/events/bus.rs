//! Notification bus: fan-out of job events to subscribers and observers.
//!
//! One bus is built per process and passed by `Arc` to every job and worker.
//! Two delivery paths:
//! - broadcast subscribers (`subscribe`, `subscribe_to`) for outside observers
//! - registered observers, each called on its own execution context through a
//!   posted task, so a delivery never re-enters the publisher

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use super::model::{JobEvent, JobId};
use crate::context::TaskRunner;

/// Receiver of events registered on the bus.
pub trait JobEventObserver: Send + Sync {
    /// Called on the observer's runner. The bus holds a strong reference for
    /// the duration of the call.
    fn on_job_event(self: Arc<Self>, event: &JobEvent);
}

struct ObserverEntry {
    source: JobId,
    runner: TaskRunner,
    observer: Weak<dyn JobEventObserver>,
    active: Arc<AtomicBool>,
}

/// Per-process event bus.
pub struct NotificationBus {
    tx: broadcast::Sender<JobEvent>,
    observers: Mutex<Vec<ObserverEntry>>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(capacity);
        Arc::new(Self {
            tx,
            observers: Mutex::new(Vec::new()),
        })
    }

    /// Every event from every job.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }

    /// Events published by one job.
    pub fn subscribe_to(&self, source: JobId) -> JobEventStream {
        JobEventStream {
            rx: self.tx.subscribe(),
            source,
        }
    }

    /// Register `observer` for events from `source`, delivered on `runner`.
    ///
    /// The bus keeps only a weak reference. Delivery stops when the returned
    /// `Registration` is dropped, including deliveries already queued.
    pub fn register(
        &self,
        source: JobId,
        runner: TaskRunner,
        observer: Weak<dyn JobEventObserver>,
    ) -> Registration {
        let active = Arc::new(AtomicBool::new(true));
        self.lock_observers().push(ObserverEntry {
            source,
            runner,
            observer,
            active: Arc::clone(&active),
        });
        debug!(job_id = %source, "Registered job event observer");
        Registration { source, active }
    }

    /// Publish an event to subscribers and matching observers.
    pub fn publish(&self, event: JobEvent) {
        debug!(job_id = %event.source, kind = %event.kind, "Publishing job event");

        // Fine if nobody is subscribed.
        let _ = self.tx.send(event.clone());

        let deliveries: Vec<_> = {
            let mut observers = self.lock_observers();
            observers.retain(|entry| {
                entry.active.load(Ordering::Acquire) && entry.observer.strong_count() > 0
            });
            observers
                .iter()
                .filter(|entry| entry.source == event.source)
                .filter_map(|entry| {
                    entry.observer.upgrade().map(|observer| {
                        (entry.runner.clone(), observer, Arc::clone(&entry.active))
                    })
                })
                .collect()
        };

        for (runner, observer, active) in deliveries {
            let event = event.clone();
            runner.post(move || {
                if active.load(Ordering::Acquire) {
                    observer.on_job_event(&event);
                }
            });
        }
    }

    /// Number of live observer registrations.
    pub fn observer_count(&self) -> usize {
        self.lock_observers()
            .iter()
            .filter(|entry| entry.active.load(Ordering::Acquire) && entry.observer.strong_count() > 0)
            .count()
    }

    fn lock_observers(&self) -> std::sync::MutexGuard<'_, Vec<ObserverEntry>> {
        self.observers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for NotificationBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationBus")
            .field("subscribers", &self.tx.receiver_count())
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Live observer registration. Dropping it unregisters.
#[derive(Debug)]
pub struct Registration {
    source: JobId,
    active: Arc<AtomicBool>,
}

impl Registration {
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        debug!(job_id = %self.source, "Removed job event observer");
    }
}

/// Stream of events from a single job.
pub struct JobEventStream {
    rx: broadcast::Receiver<JobEvent>,
    source: JobId,
}

impl JobEventStream {
    /// Next event from this job, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<JobEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.source == self.source => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(job_id = %self.source, skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Next already-published event from this job, without waiting.
    pub fn try_recv(&mut self) -> Option<JobEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.source == self.source => return Some(event),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!(job_id = %self.source, skipped, "Event subscriber lagged");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }

    /// Convert into a `Stream` of this job's events.
    pub fn into_stream(self) -> impl Stream<Item = JobEvent> + Send + Unpin + 'static {
        let source = self.source;
        BroadcastStream::new(self.rx).filter_map(move |item| match item {
            Ok(event) if event.source == source => Some(event),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                warn!(job_id = %source, skipped, "Event stream lagged");
                None
            }
        })
    }
}
