//! Dedicated task thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use super::exit::ThreadExit;
use super::runner::{Message, TaskRunner};
use crate::error::ContextError;

/// An OS thread running a current-thread tokio runtime that executes posted
/// tasks one at a time.
///
/// Delayed tasks and reply plumbing are driven by the runtime between tasks,
/// so a long task delays timers but never reorders the queue.
pub struct TaskThread {
    name: String,
    runner: TaskRunner,
    quit_soon: Arc<AtomicBool>,
    joined: AtomicBool,
    join: Mutex<Option<JoinHandle<()>>>,
    exit: ThreadExit,
}

impl TaskThread {
    /// Spawn a named task thread.
    pub fn spawn(name: impl Into<String>) -> Result<Self, ContextError> {
        let name = name.into();
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| ContextError::Runtime {
                name: name.clone(),
                source,
            })?;
        let handle = runtime.handle().clone();

        let (tx, rx) = mpsc::unbounded_channel();
        let quit_soon = Arc::new(AtomicBool::new(false));
        let exit = ThreadExit::new();

        let join = {
            let quit_soon = Arc::clone(&quit_soon);
            let exit = exit.clone();
            let thread_name = name.clone();
            std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || {
                    let _exit = exit.signal_on_drop();
                    run_loop(runtime, rx, quit_soon, &thread_name);
                })
                .map_err(|source| ContextError::Spawn {
                    name: name.clone(),
                    source,
                })?
        };

        let runner = TaskRunner::new(&name, join.thread().id(), tx, handle);
        debug!(thread = %name, "Task thread started");

        Ok(Self {
            name,
            runner,
            quit_soon,
            joined: AtomicBool::new(false),
            join: Mutex::new(Some(join)),
            exit,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runner for posting tasks to this thread.
    pub fn runner(&self) -> &TaskRunner {
        &self.runner
    }

    /// The runner, while the thread has not been joined.
    pub fn runner_if_running(&self) -> Option<TaskRunner> {
        self.is_running().then(|| self.runner.clone())
    }

    /// True until `stop` has joined the thread.
    pub fn is_running(&self) -> bool {
        !self.joined.load(Ordering::Acquire)
    }

    /// Signal raised when the run loop exits.
    pub fn exit_signal(&self) -> ThreadExit {
        self.exit.clone()
    }

    /// Ask the thread to exit after its current task. Queued tasks are
    /// dropped without running. Does not wait.
    pub fn stop_soon(&self) {
        self.quit_soon.store(true, Ordering::Release);
        self.runner.send(Message::Quit);
    }

    /// Run the tasks already queued, exit, and join the thread.
    ///
    /// Idempotent. Blocks, so call it from a thread that may block; calling
    /// it from the task thread itself panics.
    pub fn stop(&self) {
        assert!(
            !self.runner.runs_tasks_on_current_thread(),
            "task thread {} cannot stop itself",
            self.name
        );
        let Some(handle) = self
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };

        self.runner.send(Message::Quit);
        if handle.join().is_err() {
            warn!(thread = %self.name, "Task thread terminated by a panic");
        }
        self.joined.store(true, Ordering::Release);
        debug!(thread = %self.name, "Task thread joined");
    }
}

impl Drop for TaskThread {
    fn drop(&mut self) {
        // Detach rather than join: the last owner may be running on this very thread.
        if self.is_running() {
            self.runner.send(Message::Quit);
        }
    }
}

fn run_loop(
    runtime: Runtime,
    mut rx: mpsc::UnboundedReceiver<Message>,
    quit_soon: Arc<AtomicBool>,
    name: &str,
) {
    runtime.block_on(async {
        while let Some(message) = rx.recv().await {
            if quit_soon.load(Ordering::Acquire) {
                break;
            }
            match message {
                Message::Run(task) => {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                        error!(thread = %name, "Task panicked, terminating thread");
                        panic::resume_unwind(payload);
                    }
                }
                Message::Quit => break,
            }
        }
    });

    // Queued tasks may hold the last reference to their owner; release them here.
    drop(rx);
    runtime.shutdown_background();
    debug!(thread = %name, "Task thread exiting");
}
