//! Status enums for Runs and batch items.

use serde::{Deserialize, Serialize};

/// Observable status of a Run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No run in flight; zeroed snapshot.
    #[default]
    Idle,
    /// Trigger request issued, server not yet heard from.
    Starting,
    /// Server acknowledged the run and is processing.
    Running,
    /// Run finished with a result.
    Succeeded,
    /// Run finished with an error.
    Failed,
}

impl RunStatus {
    /// Returns true if the run is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Returns true if the run is still active (not terminal).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }
}

/// Status of a single item within a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Queued, not yet attempted.
    #[default]
    Pending,
    /// Run in flight for this item.
    Processing,
    /// Run resolved successfully.
    Success,
    /// Run resolved with an error.
    Error,
}

impl ItemStatus {
    /// Returns true if the item has settled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}
