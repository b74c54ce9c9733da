//! Print settings value type.
//!
//! The job only copies and clears settings; it never interprets them.

use serde::{Deserialize, Serialize};

/// Settings a document is printed with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrintSettings {
    /// Target device. Empty when no printer is selected.
    pub device_name: String,
    pub copies: u32,
    pub dpi: u32,
    pub landscape: bool,
    pub selection_only: bool,
}

impl PrintSettings {
    pub fn new(device_name: impl Into<String>) -> Self {
        Self {
            device_name: device_name.into(),
            copies: 1,
            dpi: 300,
            ..Default::default()
        }
    }

    /// Reset to the empty state.
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// True once a printer has been chosen.
    pub fn is_configured(&self) -> bool {
        !self.device_name.is_empty()
    }
}
