//! Execution contexts: dedicated threads that run posted tasks in order.
//!
//! Core components:
//! - `thread`: `TaskThread`, an OS thread draining a FIFO task queue
//! - `runner`: `TaskRunner`, the cloneable handle used to post work to it
//! - `exit`: `ThreadExit`, signaled once a task thread has finished
//!
//! Both the coordinating context and every worker context are task threads.
//! Blocking teardown work goes to the runtime's blocking pool through
//! `TaskRunner::post_task_and_reply`.

pub mod exit;
pub mod runner;
pub mod thread;

pub use exit::ThreadExit;
pub use runner::{Task, TaskRunner};
pub use thread::TaskThread;
