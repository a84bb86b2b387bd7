//! Batch orchestrator for docrun.
//!
//! Drives N independent runs over one capability with per-item failure
//! isolation, aggregate progress reporting, and a consolidated exportable
//! report.

pub mod dispatch;
pub mod error;
pub mod export;
pub mod handler;
pub mod processor;

pub use dispatch::RunDispatcher;
pub use error::BatchError;
pub use export::{JsonReportWriter, ReportWriter};
pub use handler::{BatchHandler, NullHandler};
pub use processor::{BatchOptions, BatchProcessor};
