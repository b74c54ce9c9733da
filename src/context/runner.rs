//! Handle for posting work to a task thread.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::ContextError;

/// A unit of work run on an execution context.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub(crate) enum Message {
    Run(Task),
    Quit,
}

/// Cloneable handle to a `TaskThread`'s queue.
///
/// Tasks run one at a time, in posting order, on the owning thread. Posting
/// never blocks. A runner outliving its thread simply fails to post.
#[derive(Clone)]
pub struct TaskRunner {
    name: Arc<str>,
    thread_id: ThreadId,
    tx: mpsc::UnboundedSender<Message>,
    handle: Handle,
}

impl TaskRunner {
    pub(crate) fn new(
        name: &str,
        thread_id: ThreadId,
        tx: mpsc::UnboundedSender<Message>,
        handle: Handle,
    ) -> Self {
        Self {
            name: Arc::from(name),
            thread_id,
            tx,
            handle,
        }
    }

    /// Name of the thread this runner posts to.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when called from the thread that runs this runner's tasks.
    pub fn runs_tasks_on_current_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Post a task. Returns `false` if the thread has already exited.
    pub fn post<F>(&self, task: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let posted = self.send(Message::Run(Box::new(task)));
        if !posted {
            debug!(thread = %self.name, "Dropping task posted to stopped thread");
        }
        posted
    }

    /// Post a task that runs after `delay`.
    pub fn post_delayed<F>(&self, task: F, delay: Duration)
    where
        F: FnOnce() + Send + 'static,
    {
        let tx = self.tx.clone();
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Message::Run(Box::new(task)));
        });
    }

    /// Run `task` on the blocking pool, then post `reply` back to this thread.
    ///
    /// The reply is posted even if `task` panicked.
    pub fn post_task_and_reply<T, R>(&self, task: T, reply: R)
    where
        T: FnOnce() + Send + 'static,
        R: FnOnce() + Send + 'static,
    {
        let tx = self.tx.clone();
        let name = Arc::clone(&self.name);
        let blocking = self.handle.spawn_blocking(task);
        self.handle.spawn(async move {
            if let Err(e) = blocking.await {
                warn!(thread = %name, error = %e, "Blocking pool task did not complete");
            }
            if tx.send(Message::Run(Box::new(reply))).is_err() {
                debug!(thread = %name, "Reply dropped, thread already stopped");
            }
        });
    }

    /// Run `f` on this runner's thread and wait for its result.
    ///
    /// A panic inside `f` is resumed on the calling thread. Must not be
    /// called from the runner's own thread or from async code.
    pub fn invoke<F, R>(&self, f: F) -> Result<R, ContextError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        assert!(
            !self.runs_tasks_on_current_thread(),
            "invoke() on {} from its own thread would deadlock",
            self.name
        );

        let (result_tx, result_rx) = oneshot::channel();
        let posted = self.send(Message::Run(Box::new(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(f));
            let _ = result_tx.send(result);
        })));
        if !posted {
            return Err(self.closed());
        }

        match result_rx.blocking_recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => Err(self.closed()),
        }
    }

    pub(crate) fn send(&self, message: Message) -> bool {
        self.tx.send(message).is_ok()
    }

    fn closed(&self) -> ContextError {
        ContextError::Closed {
            name: self.name.to_string(),
        }
    }
}

impl fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRunner")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .finish()
    }
}
