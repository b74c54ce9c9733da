//! Print job lifecycle.
//!
//! Core components:
//! - `controller`: `PrintJob`, the state machine driven from the coordinating context
//! - `state`: lifecycle flags and the derived `JobStatus`
//! - `shutdown`: worker teardown hazard strategies
//! - `flush`: completion signal behind `flush_and_wait`

pub mod controller;
pub mod flush;
pub mod shutdown;
pub mod state;

pub use controller::PrintJob;
pub use shutdown::{NoHazard, RestrictedWait, ShutdownHazard};
pub use state::{JobFlags, JobStatus};
