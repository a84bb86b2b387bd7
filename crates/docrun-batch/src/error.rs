//! Error types for batch processing.

use thiserror::Error;

/// Errors that can occur while exporting batch results.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Export requested before any item settled.
    #[error("no results to export")]
    NoResults,

    /// A report writer failed for a writer-specific reason.
    #[error("export failed: {0}")]
    Export(String),

    /// Filesystem failure while writing the artifact.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to encode the report.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
