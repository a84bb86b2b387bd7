//! Lifecycle events pushed by the backend for a run.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One lifecycle event, as delivered on the event channel.
///
/// Wire shape is `{type, runId?, timestamp?, data?}` with `timestamp` in
/// epoch milliseconds. Every field besides `type` is optional; consumers
/// fall back to previous state when a field is absent. Event types this
/// client does not recognize deserialize as [`RunEvent::Unknown`] and are
/// recorded without any other effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    /// The server acknowledged the run and began processing.
    RunStarted {
        #[serde(default)]
        data: Option<Value>,
        #[serde(default, rename = "runId")]
        run_id: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
    },

    /// Intermediate progress report.
    Progress {
        #[serde(default)]
        data: Option<ProgressData>,
        #[serde(default, rename = "runId")]
        run_id: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
    },

    /// Streaming content fragment.
    ContentChunk {
        #[serde(default)]
        data: Option<ChunkData>,
        #[serde(default, rename = "runId")]
        run_id: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
    },

    /// Terminal success event carrying the result.
    RunFinished {
        #[serde(default)]
        data: Option<FinishedData>,
        #[serde(default, rename = "runId")]
        run_id: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
    },

    /// Terminal failure event carrying the error message.
    RunError {
        #[serde(default)]
        data: Option<ErrorData>,
        #[serde(default, rename = "runId")]
        run_id: Option<String>,
        #[serde(default)]
        timestamp: Option<i64>,
    },

    /// Unknown event type (forward compatibility fallback).
    #[serde(untagged)]
    Unknown(Value),
}

/// Payload of a `progress` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressData {
    #[serde(default)]
    pub progress: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of a `content_chunk` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkData {
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default, alias = "chunkIndex")]
    pub chunk_index: Option<u32>,
}

/// Payload of a `run_finished` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinishedData {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub duration: Option<i64>,
}

/// Payload of a `run_error` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorData {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
}

impl RunEvent {
    /// Create a `run_started` event.
    pub fn started(run_id: impl Into<String>) -> Self {
        Self::RunStarted {
            data: None,
            run_id: Some(run_id.into()),
            timestamp: None,
        }
    }

    /// Create a `progress` event.
    pub fn progress(progress: u32, message: impl Into<String>) -> Self {
        Self::Progress {
            data: Some(ProgressData {
                progress: Some(progress),
                message: Some(message.into()),
            }),
            run_id: None,
            timestamp: None,
        }
    }

    /// Create a `run_finished` event.
    pub fn finished(result: Option<Value>) -> Self {
        Self::RunFinished {
            data: Some(FinishedData {
                result,
                duration: None,
            }),
            run_id: None,
            timestamp: None,
        }
    }

    /// Create a `run_error` event.
    pub fn error(message: impl Into<String>) -> Self {
        Self::RunError {
            data: Some(ErrorData {
                error: Some(message.into()),
                duration: None,
            }),
            run_id: None,
            timestamp: None,
        }
    }

    /// Extract the run id from any event type, when present.
    pub fn run_id(&self) -> Option<&str> {
        match self {
            Self::RunStarted { run_id, .. }
            | Self::Progress { run_id, .. }
            | Self::ContentChunk { run_id, .. }
            | Self::RunFinished { run_id, .. }
            | Self::RunError { run_id, .. } => run_id.as_deref(),
            Self::Unknown(value) => value.get("runId").and_then(|v| v.as_str()),
        }
    }

    /// Returns true for the two terminal event types.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::RunFinished { .. } | Self::RunError { .. })
    }
}
