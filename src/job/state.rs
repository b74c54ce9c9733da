//! Lifecycle flags of a print job.

use serde::{Deserialize, Serialize};

/// Derived lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// No job dispatched.
    Idle,
    /// Job dispatched to the worker and not finished.
    Pending,
    /// Inside `cancel`.
    Canceling,
    /// Worker teardown running on the blocking pool.
    Stopping,
    /// Worker teardown confirmed.
    Stopped,
}

impl JobStatus {
    /// Whether the job is waiting on its worker in any way.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Canceling | Self::Stopping)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Pending => "pending",
            Self::Canceling => "canceling",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
        };
        write!(f, "{s}")
    }
}

/// Raw flags mutated by the controller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct JobFlags {
    pub pending: bool,
    pub canceling: bool,
    pub stopping: bool,
    pub stopped: bool,
}

impl JobFlags {
    /// Collapse the flags into a status. `canceling` overlays everything.
    pub fn status(&self) -> JobStatus {
        if self.canceling {
            JobStatus::Canceling
        } else if self.stopping {
            JobStatus::Stopping
        } else if self.pending {
            JobStatus::Pending
        } else if self.stopped {
            JobStatus::Stopped
        } else {
            JobStatus::Idle
        }
    }
}
