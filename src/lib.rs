//! Print job: lifecycle controller for a print job whose blocking work runs
//! on a dedicated worker thread while it is driven from a coordinating thread.

pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod events;
pub mod job;
pub mod settings;
pub mod worker;

pub use error::{Error, Result};
pub use job::PrintJob;
