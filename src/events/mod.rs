//! Print job events and the bus that carries them.
//!
//! - `model`: `JobEventKind`, `JobEvent`, `JobId`
//! - `bus`: `NotificationBus`, per-job streams and observer registrations

pub mod bus;
pub mod model;

pub use bus::{JobEventObserver, JobEventStream, NotificationBus, Registration};
pub use model::{JobEvent, JobEventKind, JobEventSummary, JobId};
