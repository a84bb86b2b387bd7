//! Reduced, observable state of a single run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::RunEvent;
use crate::status::RunStatus;

/// Default error message when a `run_error` event carries none.
const UNKNOWN_ERROR: &str = "Unknown error occurred";

/// The observable snapshot of one run, reduced from its event sequence.
///
/// `apply` is a pure function of (state, event): replaying the same event
/// sequence from [`RunState::default`] always produces the same snapshot.
/// The `events` field is the append-only audit trail; every event lands
/// there, including ones that change nothing else.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub status: RunStatus,
    pub progress: u8,
    pub message: String,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub events: Vec<RunEvent>,
}

impl RunState {
    /// Zeroed snapshot for a fresh run.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the trigger request as issued, before any server event.
    ///
    /// Keeps UI state honest: the run shows `starting`, never `running`,
    /// until the server acknowledges with `run_started`.
    pub fn begin(mut self) -> Self {
        if self.status == RunStatus::Idle {
            self.status = RunStatus::Starting;
        }
        self
    }

    /// Reduce one event into the next snapshot.
    ///
    /// Events arriving after a terminal state are appended to the log and
    /// otherwise ignored, as are unknown event types and progress values
    /// that would move the bar backwards.
    pub fn apply(mut self, event: RunEvent) -> Self {
        let frozen = self.status.is_terminal();
        match &event {
            RunEvent::RunStarted { .. } if !frozen => {
                self.status = RunStatus::Running;
                self.progress = 0;
                self.message = "Starting...".to_string();
                self.error = None;
            }
            RunEvent::Progress { data, .. } if !frozen => {
                if let Some(data) = data {
                    if let Some(progress) = data.progress {
                        let clamped = progress.min(100) as u8;
                        if clamped > self.progress {
                            self.progress = clamped;
                        }
                    }
                    if let Some(message) = &data.message {
                        self.message = message.clone();
                    }
                }
            }
            RunEvent::ContentChunk { data, .. } if !frozen => {
                let index = data
                    .as_ref()
                    .and_then(|d| d.chunk_index)
                    .unwrap_or_default();
                self.message = format!("Processing content... ({})", index);
            }
            RunEvent::RunFinished { data, .. } if !frozen => {
                self.status = RunStatus::Succeeded;
                self.progress = 100;
                self.message = "Completed".to_string();
                self.result = data.as_ref().and_then(|d| d.result.clone());
            }
            RunEvent::RunError { data, .. } if !frozen => {
                self.status = RunStatus::Failed;
                self.error = Some(
                    data.as_ref()
                        .and_then(|d| d.error.clone())
                        .unwrap_or_else(|| UNKNOWN_ERROR.to_string()),
                );
            }
            // Terminal state frozen, or unknown type: log-only.
            _ => {}
        }
        self.events.push(event);
        self
    }

    /// Return to the zeroed snapshot.
    pub fn reset(self) -> Self {
        Self::default()
    }

    /// Number of events observed so far.
    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}
