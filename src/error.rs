//! Error types for print jobs.
//!
//! Contract breaches (double initialize, destroying a pending job, swapping
//! the document mid-job) are not represented here. Those panic.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Execution context error: {0}")]
    Context(#[from] ContextError),
}

/// Errors raised by execution contexts (task threads and their runners).
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("Failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to build task runtime for {name}: {source}")]
    Runtime {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Execution context {name} is no longer running")]
    Closed { name: String },
}

/// Result type alias for print jobs.
pub type Result<T> = std::result::Result<T, Error>;
