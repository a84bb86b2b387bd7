//! Report export collaborator boundary.

use std::path::Path;

use async_trait::async_trait;

use docrun_core::BatchReport;

use crate::error::BatchError;

/// Writes the consolidated batch report as a downloadable artifact.
///
/// The orchestrator's only obligation is the order-preserving
/// [`BatchReport`] projection; the artifact format belongs to the writer.
/// A spreadsheet or document generator plugs in here.
#[async_trait]
pub trait ReportWriter: Send + Sync {
    /// Extension used when the caller supplies no file name.
    fn file_extension(&self) -> &'static str;

    /// Write the report to `path`.
    async fn write(&self, report: &BatchReport, path: &Path) -> Result<(), BatchError>;
}

/// Writer producing a pretty-printed JSON report.
pub struct JsonReportWriter;

#[async_trait]
impl ReportWriter for JsonReportWriter {
    fn file_extension(&self) -> &'static str {
        "json"
    }

    async fn write(&self, report: &BatchReport, path: &Path) -> Result<(), BatchError> {
        let bytes = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docrun_core::{BatchItem, ItemStatus};
    use serde_json::json;

    #[tokio::test]
    async fn test_json_writer_round_trip() {
        let mut item = BatchItem::pending("a.pdf", 10);
        item.succeed(Some(json!({"total": "42.00"})), 120);
        let report = BatchReport::from_items(&[item]);

        let path = std::env::temp_dir().join(format!(
            "docrun-report-{}.json",
            uuid::Uuid::new_v4()
        ));
        JsonReportWriter.write(&report, &path).await.unwrap();

        let bytes = tokio::fs::read(&path).await.unwrap();
        let back: BatchReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.rows[0].file_name, "a.pdf");
        assert_eq!(back.rows[0].status, ItemStatus::Success);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
