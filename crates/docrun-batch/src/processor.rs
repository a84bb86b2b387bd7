//! Batch orchestrator.
//!
//! Processes an ordered list of files through one capability with per-item
//! failure isolation: a failing item settles as `error` and the batch runs
//! to the end of the list regardless. Execution is strictly sequential by
//! default; `BatchOptions::concurrency` switches to an order-preserving
//! bounded pool.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::StreamExt;
use tracing::{info, warn};

use docrun_client::{AgentInput, DocumentFile};
use docrun_core::{AgentType, BatchItem, BatchProgress, BatchReport, ItemStatus};

use crate::dispatch::RunDispatcher;
use crate::error::BatchError;
use crate::export::ReportWriter;
use crate::handler::{BatchHandler, NullHandler};

/// Options applied to every item of a batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Prompt forwarded to the capability.
    pub prompt: Option<String>,

    /// Required field names forwarded to the capability.
    pub required_fields: Option<Vec<String>>,

    /// Output format forwarded to the capability.
    pub format: Option<String>,

    /// Per-item wall-clock limit. On expiry the item settles as an error
    /// and the next item starts. `None` waits indefinitely.
    pub item_timeout: Option<Duration>,

    /// Number of items in flight at once. `1` is strictly sequential;
    /// larger values overlap execution while preserving result order.
    pub concurrency: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            prompt: None,
            required_fields: None,
            format: None,
            item_timeout: None,
            concurrency: 1,
        }
    }
}

/// Drives N independent runs over the same capability and aggregates the
/// outcomes into an ordered [`BatchItem`] list.
pub struct BatchProcessor {
    dispatcher: Arc<dyn RunDispatcher>,
    handler: Arc<dyn BatchHandler>,
    items: Vec<BatchItem>,
    progress: BatchProgress,
    is_processing: bool,
    error: Option<String>,
}

impl BatchProcessor {
    /// Create a processor over the given dispatcher, observing nothing.
    pub fn new(dispatcher: Arc<dyn RunDispatcher>) -> Self {
        Self::with_handler(dispatcher, Arc::new(NullHandler))
    }

    /// Create a processor with a batch observer.
    pub fn with_handler(
        dispatcher: Arc<dyn RunDispatcher>,
        handler: Arc<dyn BatchHandler>,
    ) -> Self {
        Self {
            dispatcher,
            handler,
            items: Vec::new(),
            progress: BatchProgress::default(),
            is_processing: false,
            error: None,
        }
    }

    /// Process every file through `agent`, in submission order.
    ///
    /// Outcomes are delivered through the handler and the [`results`]
    /// accessor, never as a return value. An empty file list records an
    /// error and performs no work. No failure of any single item aborts
    /// the batch; the completion callback fires exactly once, after the
    /// last item settles.
    ///
    /// [`results`]: BatchProcessor::results
    pub async fn process_files(
        &mut self,
        files: Vec<DocumentFile>,
        agent: AgentType,
        options: BatchOptions,
    ) {
        if files.is_empty() {
            let message = "No files selected for processing";
            warn!("{}", message);
            self.error = Some(message.to_string());
            self.handler.on_error(message).await;
            return;
        }

        self.is_processing = true;
        self.error = None;
        self.progress = BatchProgress::default();
        self.items = files
            .iter()
            .map(|file| BatchItem::pending(&file.name, file.size()))
            .collect();

        let total = files.len();
        info!(total = total, agent = %agent, "Starting batch");

        if options.concurrency <= 1 {
            self.run_sequential(files, &agent, &options, total).await;
        } else {
            self.run_bounded(files, &agent, &options, total).await;
        }

        self.is_processing = false;
        info!(
            total = total,
            succeeded = self.success_count(),
            failed = self.error_count(),
            "Batch complete"
        );
        self.handler.on_complete(&self.items).await;
    }

    async fn run_sequential(
        &mut self,
        files: Vec<DocumentFile>,
        agent: &AgentType,
        options: &BatchOptions,
        total: usize,
    ) {
        let dispatcher = self.dispatcher.clone();
        let handler = self.handler.clone();

        for (index, file) in files.into_iter().enumerate() {
            let progress = BatchProgress::attempt(index + 1, total, &file.name);
            self.progress = progress.clone();
            handler.on_progress(&progress).await;

            self.items[index].start();
            let input = item_input(file, options);
            let started = Instant::now();
            let outcome =
                run_item(dispatcher.as_ref(), agent, input, options.item_timeout).await;
            settle(&mut self.items[index], outcome, started.elapsed());
            handler.on_item_settled(&self.items[index]).await;
        }
    }

    /// Bounded pool: items overlap in flight, results are applied in
    /// submission order, isolation is unchanged.
    async fn run_bounded(
        &mut self,
        files: Vec<DocumentFile>,
        agent: &AgentType,
        options: &BatchOptions,
        total: usize,
    ) {
        let concurrency = options.concurrency;
        let dispatcher = self.dispatcher.clone();
        let handler = self.handler.clone();

        let jobs: Vec<_> = files
            .into_iter()
            .enumerate()
            .map(|(index, file)| {
                let file_name = file.name.clone();
                let input = item_input(file, options);
                let dispatcher = dispatcher.clone();
                let handler = handler.clone();
                let agent = agent.clone();
                let item_timeout = options.item_timeout;
                async move {
                    let progress = BatchProgress::attempt(index + 1, total, &file_name);
                    handler.on_progress(&progress).await;
                    let started = Instant::now();
                    let outcome =
                        run_item(dispatcher.as_ref(), &agent, input, item_timeout).await;
                    (index, outcome, started.elapsed(), progress)
                }
            })
            .collect();

        let mut stream = std::pin::pin!(futures::stream::iter(jobs).buffered(concurrency));
        while let Some((index, outcome, elapsed, progress)) = stream.next().await {
            if progress.current > self.progress.current {
                self.progress = progress;
            }
            self.items[index].start();
            settle(&mut self.items[index], outcome, elapsed);
            self.handler.on_item_settled(&self.items[index]).await;
        }
    }

    /// Export the consolidated report through the given writer.
    ///
    /// With no results this records an error and performs no export. The
    /// default file name is `batch-results-<epoch-millis>.<ext>`.
    pub async fn export_results(
        &mut self,
        writer: &dyn ReportWriter,
        path: Option<PathBuf>,
    ) -> Result<PathBuf, BatchError> {
        if self.items.is_empty() {
            let message = "No results to export";
            warn!("{}", message);
            self.error = Some(message.to_string());
            self.handler.on_error(message).await;
            return Err(BatchError::NoResults);
        }

        let report = BatchReport::from_items(&self.items);
        let path = path.unwrap_or_else(|| {
            PathBuf::from(format!(
                "batch-results-{}.{}",
                Utc::now().timestamp_millis(),
                writer.file_extension()
            ))
        });

        match writer.write(&report, &path).await {
            Ok(()) => {
                info!(path = %path.display(), rows = report.len(), "Exported batch report");
                Ok(path)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Export failed");
                self.error = Some(message.clone());
                self.handler.on_error(&message).await;
                Err(e)
            }
        }
    }

    /// Return to the zero state. Idempotent.
    pub fn reset(&mut self) {
        self.is_processing = false;
        self.items.clear();
        self.progress = BatchProgress::default();
        self.error = None;
    }

    /// The ordered item list.
    pub fn results(&self) -> &[BatchItem] {
        &self.items
    }

    /// Latest aggregate progress.
    pub fn progress(&self) -> &BatchProgress {
        &self.progress
    }

    /// Batch-level error, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Whether a batch is currently running.
    pub fn is_processing(&self) -> bool {
        self.is_processing
    }

    /// Whether any items have been recorded.
    pub fn has_results(&self) -> bool {
        !self.items.is_empty()
    }

    /// Number of items that settled successfully.
    pub fn success_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Success)
            .count()
    }

    /// Number of items that settled with an error.
    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|item| item.status == ItemStatus::Error)
            .count()
    }
}

/// Per-item input: the file plus the batch-wide options.
fn item_input(file: DocumentFile, options: &BatchOptions) -> AgentInput {
    let mut input = AgentInput::new().with_document(file);
    if let Some(prompt) = &options.prompt {
        input = input.with_prompt(prompt.clone());
    }
    if let Some(fields) = &options.required_fields {
        input = input.with_required_fields(fields.clone());
    }
    if let Some(format) = &options.format {
        input = input.with_format(format.clone());
    }
    input
}

/// Dispatch one item, folding timeouts and dispatch errors into a message.
async fn run_item(
    dispatcher: &dyn RunDispatcher,
    agent: &AgentType,
    input: AgentInput,
    item_timeout: Option<Duration>,
) -> Result<docrun_client::RunOutcome, String> {
    let fut = dispatcher.dispatch(agent, input);
    let result = match item_timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                return Err(format!(
                    "timed out after {} ms",
                    limit.as_millis()
                ))
            }
        },
        None => fut.await,
    };
    result.map_err(|e| e.to_string())
}

/// Apply one item's outcome.
fn settle(
    item: &mut BatchItem,
    outcome: Result<docrun_client::RunOutcome, String>,
    elapsed: Duration,
) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match outcome {
        Ok(outcome) if outcome.success => {
            info!(file = %item.file_name, elapsed_ms = elapsed_ms, "Batch item succeeded");
            item.succeed(outcome.data, elapsed_ms);
        }
        Ok(outcome) => {
            let message = outcome
                .error
                .unwrap_or_else(|| "Unknown error".to_string());
            warn!(file = %item.file_name, error = %message, "Batch item failed");
            item.fail(message, elapsed_ms);
        }
        Err(message) => {
            warn!(file = %item.file_name, error = %message, "Batch item failed");
            item.fail(message, elapsed_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docrun_client::{ClientError, RunOutcome};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Dispatcher with a scripted outcome per file name.
    struct ScriptedDispatcher {
        outcomes: HashMap<String, Result<RunOutcome, String>>,
        delay: Option<Duration>,
    }

    impl ScriptedDispatcher {
        fn new(outcomes: Vec<(&str, Result<RunOutcome, String>)>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: outcomes
                    .into_iter()
                    .map(|(name, outcome)| (name.to_string(), outcome))
                    .collect(),
                delay: None,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                outcomes: HashMap::new(),
                delay: Some(delay),
            })
        }
    }

    #[async_trait]
    impl RunDispatcher for ScriptedDispatcher {
        async fn dispatch(
            &self,
            _agent: &AgentType,
            input: AgentInput,
        ) -> Result<RunOutcome, ClientError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let name = input
                .document
                .as_ref()
                .map(|d| d.name.clone())
                .unwrap_or_default();
            match self.outcomes.get(&name) {
                Some(Ok(outcome)) => Ok(outcome.clone()),
                Some(Err(message)) => Err(ClientError::Transport(message.clone())),
                None => Ok(RunOutcome::success(Some(json!({"file": name})))),
            }
        }
    }

    /// Handler that records every notification.
    #[derive(Default)]
    struct CollectingHandler {
        progress: Mutex<Vec<BatchProgress>>,
        settled: Mutex<Vec<(String, ItemStatus)>>,
        completions: Mutex<Vec<usize>>,
        errors: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BatchHandler for CollectingHandler {
        async fn on_progress(&self, progress: &BatchProgress) {
            self.progress.lock().unwrap().push(progress.clone());
        }

        async fn on_item_settled(&self, item: &BatchItem) {
            self.settled
                .lock()
                .unwrap()
                .push((item.file_name.clone(), item.status));
        }

        async fn on_complete(&self, items: &[BatchItem]) {
            self.completions.lock().unwrap().push(items.len());
        }

        async fn on_error(&self, message: &str) {
            self.errors.lock().unwrap().push(message.to_string());
        }
    }

    fn files(names: &[&str]) -> Vec<DocumentFile> {
        names
            .iter()
            .map(|name| DocumentFile::new(*name, vec![0u8; 16]))
            .collect()
    }

    #[tokio::test]
    async fn test_mixed_batch_isolates_failures() {
        let dispatcher = ScriptedDispatcher::new(vec![
            ("a.pdf", Ok(RunOutcome::success(Some(json!({"n": 1}))))),
            ("b.pdf", Ok(RunOutcome::failure("bad format"))),
            ("c.pdf", Ok(RunOutcome::success(Some(json!({"n": 3}))))),
        ]);
        let handler = Arc::new(CollectingHandler::default());
        let mut processor = BatchProcessor::with_handler(dispatcher, handler.clone());

        processor
            .process_files(
                files(&["a.pdf", "b.pdf", "c.pdf"]),
                AgentType::FieldExtractor,
                BatchOptions::default(),
            )
            .await;

        let items = processor.results();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].status, ItemStatus::Success);
        assert_eq!(items[1].status, ItemStatus::Error);
        assert_eq!(items[1].error.as_deref(), Some("bad format"));
        assert_eq!(items[2].status, ItemStatus::Success);
        assert_eq!(processor.success_count(), 2);
        assert_eq!(processor.error_count(), 1);
        assert!(!processor.is_processing());

        // Completion fired exactly once, with the full list.
        assert_eq!(*handler.completions.lock().unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn test_dispatch_errors_convert_to_item_errors() {
        let dispatcher = ScriptedDispatcher::new(vec![
            ("a.pdf", Err("connection refused".to_string())),
            ("b.pdf", Err("connection refused".to_string())),
        ]);
        let mut processor = BatchProcessor::new(dispatcher);

        processor
            .process_files(
                files(&["a.pdf", "b.pdf"]),
                AgentType::FieldExtractor,
                BatchOptions::default(),
            )
            .await;

        // Every item settled terminally even though every item failed.
        assert_eq!(processor.results().len(), 2);
        for item in processor.results() {
            assert_eq!(item.status, ItemStatus::Error);
            assert!(item.error.as_ref().unwrap().contains("connection refused"));
            assert!(item.processing_time_ms.is_some());
        }
    }

    #[tokio::test]
    async fn test_progress_reflects_item_attempted() {
        let dispatcher = ScriptedDispatcher::new(vec![]);
        let handler = Arc::new(CollectingHandler::default());
        let mut processor = BatchProcessor::with_handler(dispatcher, handler.clone());

        processor
            .process_files(
                files(&["a.pdf", "b.pdf", "c.pdf"]),
                AgentType::FieldExtractor,
                BatchOptions::default(),
            )
            .await;

        let progress = handler.progress.lock().unwrap();
        assert_eq!(progress.len(), 3);
        assert_eq!(progress[0].current, 1);
        assert_eq!(progress[0].percentage, 33);
        assert_eq!(progress[0].current_file, "a.pdf");
        assert_eq!(progress[2].current, 3);
        assert_eq!(progress[2].percentage, 100);
    }

    #[tokio::test]
    async fn test_empty_batch_reports_error_and_does_no_work() {
        let dispatcher = ScriptedDispatcher::new(vec![]);
        let handler = Arc::new(CollectingHandler::default());
        let mut processor = BatchProcessor::with_handler(dispatcher, handler.clone());

        processor
            .process_files(vec![], AgentType::FieldExtractor, BatchOptions::default())
            .await;

        assert_eq!(
            processor.error(),
            Some("No files selected for processing")
        );
        assert!(!processor.has_results());
        assert!(handler.completions.lock().unwrap().is_empty());
        assert_eq!(handler.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_item_timeout_settles_as_error() {
        let dispatcher = ScriptedDispatcher::slow(Duration::from_millis(200));
        let mut processor = BatchProcessor::new(dispatcher);

        processor
            .process_files(
                files(&["slow.pdf"]),
                AgentType::FieldExtractor,
                BatchOptions {
                    item_timeout: Some(Duration::from_millis(20)),
                    ..Default::default()
                },
            )
            .await;

        let items = processor.results();
        assert_eq!(items[0].status, ItemStatus::Error);
        assert!(items[0].error.as_ref().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_bounded_concurrency_preserves_order() {
        let dispatcher = ScriptedDispatcher::new(vec![
            ("a.pdf", Ok(RunOutcome::success(Some(json!("a"))))),
            ("b.pdf", Ok(RunOutcome::failure("bad format"))),
            ("c.pdf", Ok(RunOutcome::success(Some(json!("c"))))),
            ("d.pdf", Ok(RunOutcome::success(Some(json!("d"))))),
        ]);
        let mut processor = BatchProcessor::new(dispatcher);

        processor
            .process_files(
                files(&["a.pdf", "b.pdf", "c.pdf", "d.pdf"]),
                AgentType::FieldExtractor,
                BatchOptions {
                    concurrency: 2,
                    ..Default::default()
                },
            )
            .await;

        let items = processor.results();
        assert_eq!(items.len(), 4);
        let names: Vec<_> = items.iter().map(|i| i.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf", "c.pdf", "d.pdf"]);
        assert_eq!(items[1].status, ItemStatus::Error);
        assert_eq!(processor.success_count(), 3);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent_zero_state() {
        let dispatcher = ScriptedDispatcher::new(vec![]);
        let mut processor = BatchProcessor::new(dispatcher);

        processor
            .process_files(
                files(&["a.pdf"]),
                AgentType::FieldExtractor,
                BatchOptions::default(),
            )
            .await;
        assert!(processor.has_results());

        processor.reset();
        processor.reset();

        assert!(!processor.is_processing());
        assert!(!processor.has_results());
        assert_eq!(*processor.progress(), BatchProgress::default());
        assert!(processor.error().is_none());
    }

    #[tokio::test]
    async fn test_export_with_no_results_fails_gracefully() {
        let dispatcher = ScriptedDispatcher::new(vec![]);
        let handler = Arc::new(CollectingHandler::default());
        let mut processor = BatchProcessor::with_handler(dispatcher, handler.clone());

        let result = processor
            .export_results(&crate::export::JsonReportWriter, None)
            .await;

        assert!(matches!(result, Err(BatchError::NoResults)));
        assert_eq!(processor.error(), Some("No results to export"));
        assert_eq!(handler.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_export_writes_ordered_report() {
        let dispatcher = ScriptedDispatcher::new(vec![
            ("a.pdf", Ok(RunOutcome::success(Some(json!(1))))),
            ("b.pdf", Ok(RunOutcome::failure("boom"))),
        ]);
        let mut processor = BatchProcessor::new(dispatcher);
        processor
            .process_files(
                files(&["a.pdf", "b.pdf"]),
                AgentType::FieldExtractor,
                BatchOptions::default(),
            )
            .await;

        let path = std::env::temp_dir().join(format!(
            "docrun-batch-{}.json",
            uuid::Uuid::new_v4()
        ));
        let written = processor
            .export_results(&crate::export::JsonReportWriter, Some(path.clone()))
            .await
            .unwrap();
        assert_eq!(written, path);

        let bytes = tokio::fs::read(&path).await.unwrap();
        let report: BatchReport = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(report.rows[0].file_name, "a.pdf");
        assert_eq!(report.rows[1].error.as_deref(), Some("boom"));

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
