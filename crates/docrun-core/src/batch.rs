//! Per-file bookkeeping for batch processing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::status::ItemStatus;

/// One file's record within a batch.
///
/// Created `pending` for every input when the batch starts, mutated in
/// place as its run settles, never removed while the batch lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItem {
    /// Name of the input file.
    pub file_name: String,

    /// Size of the input file in bytes.
    pub file_size: u64,

    /// Current item status.
    pub status: ItemStatus,

    /// Capability output, present only on success.
    pub result: Option<Value>,

    /// Error message, present only on error.
    pub error: Option<String>,

    /// Wall-clock duration of this item's run, in milliseconds.
    pub processing_time_ms: Option<u64>,

    /// When processing of this item began.
    pub started_at: Option<DateTime<Utc>>,

    /// When this item settled.
    pub finished_at: Option<DateTime<Utc>>,
}

impl BatchItem {
    /// Create a pending item for one input file.
    pub fn pending(file_name: impl Into<String>, file_size: u64) -> Self {
        Self {
            file_name: file_name.into(),
            file_size,
            status: ItemStatus::Pending,
            result: None,
            error: None,
            processing_time_ms: None,
            started_at: None,
            finished_at: None,
        }
    }

    /// Mark the item as in flight.
    pub fn start(&mut self) {
        self.status = ItemStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    /// Settle the item successfully.
    pub fn succeed(&mut self, result: Option<Value>, processing_time_ms: u64) {
        self.status = ItemStatus::Success;
        self.result = result;
        self.error = None;
        self.processing_time_ms = Some(processing_time_ms);
        self.finished_at = Some(Utc::now());
    }

    /// Settle the item with an error.
    pub fn fail(&mut self, error: impl Into<String>, processing_time_ms: u64) {
        self.status = ItemStatus::Error;
        self.result = None;
        self.error = Some(error.into());
        self.processing_time_ms = Some(processing_time_ms);
        self.finished_at = Some(Utc::now());
    }
}

/// Aggregate progress of a batch, reflecting the item *attempted*.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
    pub current_file: String,
}

impl BatchProgress {
    /// Progress snapshot for item `current` of `total` being attempted.
    pub fn attempt(current: usize, total: usize, current_file: impl Into<String>) -> Self {
        let percentage = if total == 0 {
            0
        } else {
            ((current as f64 / total as f64) * 100.0).round() as u8
        };
        Self {
            current,
            total,
            percentage,
            current_file: current_file.into(),
        }
    }
}

/// Order-preserving projection of batch outcomes, handed to a report
/// writer for export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub rows: Vec<ReportRow>,
}

/// One exported row, keyed by file name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub file_name: String,
    pub status: ItemStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl BatchReport {
    /// Project the full item list, preserving submission order.
    pub fn from_items(items: &[BatchItem]) -> Self {
        Self {
            rows: items
                .iter()
                .map(|item| ReportRow {
                    file_name: item.file_name.clone(),
                    status: item.status,
                    result: item.result.clone(),
                    error: item.error.clone(),
                })
                .collect(),
        }
    }

    /// Number of rows in the report.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the report carries no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
