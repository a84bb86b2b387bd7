//! Run protocol client.
//!
//! A [`RunClient`] executes one named capability against one input: it
//! issues the trigger request, attaches to the run's event stream, forwards
//! every event to a caller-supplied sink, and resolves exactly once with a
//! [`RunOutcome`]. Transport failures before a terminal event resolve as
//! run failures; closing the event channel resolves as a failure too, so
//! callers are never left pending.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use docrun_core::{AgentType, RunEvent, RunId, RunState, RunStatus};

use crate::channel::{ChannelSignal, EventChannel, EventSubscription};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::input::{AgentInput, DocumentFile, RfpSpec};
use crate::sse::SseChannel;

/// Resolution of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub success: bool,
    pub data: Option<Value>,
    pub error: Option<String>,
}

impl RunOutcome {
    /// Successful resolution carrying the capability output.
    pub fn success(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    /// Failed resolution carrying an error message.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Receives every lifecycle event of a run, in arrival order, before the
/// run resolves.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn on_event(&self, event: RunEvent);
}

/// Sink that discards all events.
pub struct NullSink;

#[async_trait]
impl EventSink for NullSink {
    async fn on_event(&self, _event: RunEvent) {}
}

/// Sink that forwards events into an unbounded channel.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<RunEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver for its events.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<RunEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn on_event(&self, event: RunEvent) {
        // Receiver may be gone; events are advisory.
        self.tx.send(event).ok();
    }
}

/// Parsed trigger response: the run id correlating the event stream, and
/// any result payload delivered inline.
#[derive(Debug, Clone)]
struct TriggerAck {
    run_id: Option<String>,
    data: Option<Value>,
}

impl TriggerAck {
    fn from_body(body: Value) -> Self {
        let run_id = body
            .get("runId")
            .or_else(|| body.get("run_id"))
            .and_then(|v| v.as_str())
            .map(str::to_owned);
        let data = match body.get("data") {
            Some(value) if !value.is_null() => Some(value.clone()),
            _ => Some(body),
        };
        Self { run_id, data }
    }
}

/// Client for executing document-processing runs.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use docrun_client::{ClientConfig, DocumentFile, NullSink, RunClient};
/// use docrun_core::AgentType;
///
/// async fn run() -> Result<(), Box<dyn std::error::Error>> {
///     let client = RunClient::new(ClientConfig::new("http://localhost:5000"))
///         .with_sse_channel();
///
///     let document = DocumentFile::from_path("invoice.pdf").await?;
///     let outcome = client
///         .extract_fields(document, Default::default(), Arc::new(NullSink))
///         .await?;
///
///     println!("success: {}", outcome.success);
///     Ok(())
/// }
/// ```
pub struct RunClient {
    http: reqwest::Client,
    config: ClientConfig,
    channel: Option<Arc<dyn EventChannel>>,
}

impl RunClient {
    /// Create a client with no event channel (degraded mode: the lifecycle
    /// is synthesized around the trigger exchange).
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            channel: None,
        }
    }

    /// Builder method to attach an event channel.
    pub fn with_channel(mut self, channel: Arc<dyn EventChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Builder method to attach the SSE channel built from this client's
    /// configuration.
    pub fn with_sse_channel(self) -> Self {
        let channel = SseChannel::new(&self.config);
        self.with_channel(Arc::new(channel))
    }

    /// The client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Cancel one in-flight run by closing its event subscription. The
    /// corresponding `execute` resolves with a failure outcome.
    pub async fn cancel(&self, run_id: &RunId) {
        if let Some(channel) = &self.channel {
            channel.close(run_id).await;
        }
    }

    /// Cancel every in-flight run on this client's channel.
    pub async fn cancel_all(&self) {
        if let Some(channel) = &self.channel {
            channel.close_all().await;
        }
    }

    /// Execute one capability against one input.
    ///
    /// Resolves exactly once. Only precondition violations return `Err`;
    /// every transport or capability failure resolves as a
    /// `RunOutcome { success: false, .. }`.
    pub async fn execute(
        &self,
        agent: &AgentType,
        input: AgentInput,
        sink: Arc<dyn EventSink>,
    ) -> Result<RunOutcome, ClientError> {
        input.validate(agent)?;

        let Some(channel) = self.channel.clone() else {
            return Ok(self.execute_degraded(agent, &input, sink.as_ref()).await);
        };

        let ack = match self.trigger(agent, &input).await {
            Ok(ack) => ack,
            Err(e) => {
                warn!(agent = %agent, error = %e, "Trigger request failed");
                return Ok(self.resolve_failed(e.to_string(), sink.as_ref()).await);
            }
        };

        let Some(run_id) = ack.run_id.clone() else {
            debug!(agent = %agent, "No run id in trigger response; resolving from body");
            return Ok(self.resolve_inline(ack, sink.as_ref()).await);
        };

        let run_id = RunId::new(run_id);
        let subscription = match channel.subscribe(&run_id).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "Event stream unavailable; resolving from body");
                return Ok(self.resolve_inline(ack, sink.as_ref()).await);
            }
        };

        let state = RunState::new().begin();
        let (_, outcome) = drive_run(subscription, sink.as_ref(), state).await;
        channel.close(&run_id).await;
        Ok(outcome)
    }

    /// Extract structured fields from a document.
    pub async fn extract_fields(
        &self,
        document: DocumentFile,
        options: AgentInput,
        sink: Arc<dyn EventSink>,
    ) -> Result<RunOutcome, ClientError> {
        self.execute(
            &AgentType::FieldExtractor,
            options.with_document(document),
            sink,
        )
        .await
    }

    /// Extract caller-specified fields from a document.
    pub async fn extract_custom_fields(
        &self,
        document: DocumentFile,
        options: AgentInput,
        sink: Arc<dyn EventSink>,
    ) -> Result<RunOutcome, ClientError> {
        self.execute(
            &AgentType::CustomFieldExtractor,
            options.with_document(document),
            sink,
        )
        .await
    }

    /// Summarize a document. Output format defaults to `pdf`.
    pub async fn summarize_document(
        &self,
        document: DocumentFile,
        mut options: AgentInput,
        sink: Arc<dyn EventSink>,
    ) -> Result<RunOutcome, ClientError> {
        if options.format.is_none() {
            options.format = Some("pdf".to_string());
        }
        self.execute(
            &AgentType::DocumentSummarizer,
            options.with_document(document),
            sink,
        )
        .await
    }

    /// Summarize an RFP document.
    pub async fn summarize_rfp(
        &self,
        document: DocumentFile,
        sink: Arc<dyn EventSink>,
    ) -> Result<RunOutcome, ClientError> {
        self.execute(
            &AgentType::RfpSummarizer,
            AgentInput::new().with_document(document),
            sink,
        )
        .await
    }

    /// Create an RFP document from structured input.
    pub async fn create_rfp(
        &self,
        spec: RfpSpec,
        sink: Arc<dyn EventSink>,
    ) -> Result<RunOutcome, ClientError> {
        self.execute(&AgentType::RfpCreator, spec.into_input()?, sink)
            .await
    }

    /// Issue the trigger request and parse its acknowledgment.
    async fn trigger(
        &self,
        agent: &AgentType,
        input: &AgentInput,
    ) -> Result<TriggerAck, ClientError> {
        let url = format!("{}{}", self.config.base_url, self.endpoint_for(agent));
        debug!(url = %url, agent = %agent, "Issuing trigger request");

        let mut request = self.http.post(&url);
        if let Some(token) = self.config.bearer_token() {
            request = request.bearer_auth(token);
        }
        if let Some(timeout) = self.config.request_timeout {
            request = request.timeout(timeout);
        }
        request = match &input.document {
            Some(document) => request.multipart(build_form(document, input)?),
            None => request.json(&input.to_json()),
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        Ok(TriggerAck::from_body(body))
    }

    /// Capability endpoint path. Authenticated clients route through the
    /// account-scoped processing endpoint.
    fn endpoint_for(&self, agent: &AgentType) -> String {
        if self.config.is_authenticated() {
            return format!("/process-auth/{}", agent.as_str());
        }
        match agent {
            AgentType::FieldExtractor => "/extract".to_string(),
            AgentType::DocumentSummarizer => "/summarize".to_string(),
            AgentType::RfpCreator => "/create-rfp".to_string(),
            AgentType::RfpSummarizer => "/summarize-rfp".to_string(),
            AgentType::CustomFieldExtractor => "/process-auth/custom-field-extractor".to_string(),
            AgentType::Other(name) => format!("/process/{}", name),
        }
    }

    /// Stream-less execution: synthesize the minimal lifecycle around the
    /// trigger exchange so sinks observe the same event shape either way.
    async fn execute_degraded(
        &self,
        agent: &AgentType,
        input: &AgentInput,
        sink: &dyn EventSink,
    ) -> RunOutcome {
        let run_id = RunId::generate();
        let mut state = RunState::new().begin();
        state = forward(state, RunEvent::started(run_id.as_str()), sink).await;

        match self.trigger(agent, input).await {
            Ok(ack) => {
                state = forward(
                    state,
                    RunEvent::progress(50, "Processing response..."),
                    sink,
                )
                .await;
                state = forward(state, RunEvent::finished(ack.data), sink).await;
            }
            Err(e) => {
                warn!(agent = %agent, error = %e, "Trigger request failed");
                state = forward(state, RunEvent::error(e.to_string()), sink).await;
            }
        }
        outcome_from_state(&state)
    }

    /// Resolve from an already-received trigger response body.
    async fn resolve_inline(&self, ack: TriggerAck, sink: &dyn EventSink) -> RunOutcome {
        let run_id = ack
            .run_id
            .unwrap_or_else(|| RunId::generate().into_inner());
        let mut state = RunState::new().begin();
        state = forward(state, RunEvent::started(run_id), sink).await;
        state = forward(
            state,
            RunEvent::progress(50, "Processing response..."),
            sink,
        )
        .await;
        state = forward(state, RunEvent::finished(ack.data), sink).await;
        outcome_from_state(&state)
    }

    /// Resolve a run that failed before any event could arrive.
    async fn resolve_failed(&self, message: String, sink: &dyn EventSink) -> RunOutcome {
        let mut state = RunState::new().begin();
        state = forward(state, RunEvent::error(message), sink).await;
        outcome_from_state(&state)
    }
}

/// Build the multipart body for a document-bearing payload.
///
/// Field names are fixed by the backend: `document`, `prompt`, `format`,
/// `requiredFields` (JSON-encoded), plus any extra fields as text.
fn build_form(
    document: &DocumentFile,
    input: &AgentInput,
) -> Result<reqwest::multipart::Form, ClientError> {
    let mime = document
        .mime
        .as_deref()
        .unwrap_or("application/octet-stream");
    let part = reqwest::multipart::Part::bytes(document.bytes.clone())
        .file_name(document.name.clone())
        .mime_str(mime)?;

    let mut form = reqwest::multipart::Form::new().part("document", part);
    if let Some(prompt) = &input.prompt {
        form = form.text("prompt", prompt.clone());
    }
    if let Some(format) = &input.format {
        form = form.text("format", format.clone());
    }
    if let Some(fields) = &input.required_fields {
        form = form.text("requiredFields", serde_json::to_string(fields)?);
    }
    for (key, value) in &input.extra {
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        form = form.text(key.clone(), text);
    }
    Ok(form)
}

/// Forward one event to the sink, then reduce it.
async fn forward(state: RunState, event: RunEvent, sink: &dyn EventSink) -> RunState {
    sink.on_event(event.clone()).await;
    state.apply(event)
}

/// Consume channel signals until the run resolves.
///
/// Resolution happens exactly once: at the first terminal event, at a
/// transport error, or when the stream closes early (cancellation).
pub(crate) async fn drive_run(
    mut subscription: EventSubscription,
    sink: &dyn EventSink,
    mut state: RunState,
) -> (RunState, RunOutcome) {
    loop {
        match subscription.next_signal().await {
            Some(ChannelSignal::Opened) => {
                debug!("Event stream open");
            }
            Some(ChannelSignal::Event(event)) => {
                state = forward(state, event, sink).await;
                if state.status.is_terminal() {
                    break;
                }
            }
            Some(ChannelSignal::TransportError(message)) => {
                if state.status.is_active() {
                    state = forward(
                        state,
                        RunEvent::error(format!("event stream failed: {}", message)),
                        sink,
                    )
                    .await;
                }
                break;
            }
            Some(ChannelSignal::Closed) | None => {
                if state.status.is_active() {
                    state = forward(
                        state,
                        RunEvent::error("run cancelled before completion"),
                        sink,
                    )
                    .await;
                }
                break;
            }
        }
    }
    let outcome = outcome_from_state(&state);
    (state, outcome)
}

fn outcome_from_state(state: &RunState) -> RunOutcome {
    match state.status {
        RunStatus::Succeeded => RunOutcome::success(state.result.clone()),
        RunStatus::Failed => RunOutcome::failure(
            state
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error occurred".to_string()),
        ),
        _ => RunOutcome::failure("run ended without a terminal event"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn client() -> RunClient {
        RunClient::new(ClientConfig::new("http://localhost:5000"))
    }

    #[test]
    fn test_endpoint_mapping() {
        let client = client();
        assert_eq!(client.endpoint_for(&AgentType::FieldExtractor), "/extract");
        assert_eq!(
            client.endpoint_for(&AgentType::DocumentSummarizer),
            "/summarize"
        );
        assert_eq!(client.endpoint_for(&AgentType::RfpCreator), "/create-rfp");
        assert_eq!(
            client.endpoint_for(&AgentType::Other("invoice".into())),
            "/process/invoice"
        );
    }

    #[test]
    fn test_endpoint_mapping_authenticated() {
        let config = ClientConfig::new("http://localhost:5000").with_auth_token("t");
        let client = RunClient::new(config);
        assert_eq!(
            client.endpoint_for(&AgentType::FieldExtractor),
            "/process-auth/field-extractor"
        );
    }

    #[test]
    fn test_trigger_ack_extracts_data_field() {
        let ack = TriggerAck::from_body(json!({"runId": "r1", "data": {"fields": 2}}));
        assert_eq!(ack.run_id.as_deref(), Some("r1"));
        assert_eq!(ack.data, Some(json!({"fields": 2})));
    }

    #[test]
    fn test_trigger_ack_falls_back_to_whole_body() {
        let ack = TriggerAck::from_body(json!({"fields": 2}));
        assert!(ack.run_id.is_none());
        assert_eq!(ack.data, Some(json!({"fields": 2})));
    }

    #[tokio::test]
    async fn test_execute_rejects_missing_document() {
        let outcome = client()
            .execute(
                &AgentType::FieldExtractor,
                AgentInput::new(),
                Arc::new(NullSink),
            )
            .await;
        assert!(matches!(outcome, Err(ClientError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_drive_run_success_sequence() {
        let (tx, sub) = EventSubscription::pair();
        tx.send(ChannelSignal::Opened).await.unwrap();
        tx.send(ChannelSignal::Event(RunEvent::started("r1")))
            .await
            .unwrap();
        tx.send(ChannelSignal::Event(RunEvent::progress(30, "scanning")))
            .await
            .unwrap();
        tx.send(ChannelSignal::Event(RunEvent::finished(Some(json!({"x": 1})))))
            .await
            .unwrap();

        let (sink, mut events) = ChannelSink::new();
        let (state, outcome) = drive_run(sub, &sink, RunState::new().begin()).await;

        assert!(outcome.success);
        assert_eq!(outcome.data, Some(json!({"x": 1})));
        assert_eq!(state.progress, 100);
        assert_eq!(state.events.len(), 3);

        // Sink saw every event, in arrival order, before resolution.
        assert!(matches!(
            events.try_recv().unwrap(),
            RunEvent::RunStarted { .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            RunEvent::Progress { .. }
        ));
        assert!(matches!(
            events.try_recv().unwrap(),
            RunEvent::RunFinished { .. }
        ));
    }

    #[tokio::test]
    async fn test_drive_run_error_surfaces_server_message() {
        let (tx, sub) = EventSubscription::pair();
        tx.send(ChannelSignal::Event(RunEvent::started("r1")))
            .await
            .unwrap();
        tx.send(ChannelSignal::Event(RunEvent::error("bad format")))
            .await
            .unwrap();

        let (_, outcome) = drive_run(sub, &NullSink, RunState::new()).await;
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("bad format"));
    }

    #[tokio::test]
    async fn test_drive_run_resolves_once_despite_duplicate_terminals() {
        let (tx, sub) = EventSubscription::pair();
        tx.send(ChannelSignal::Event(RunEvent::finished(Some(json!(1)))))
            .await
            .unwrap();
        tx.send(ChannelSignal::Event(RunEvent::error("late")))
            .await
            .unwrap();
        drop(tx);

        let (_, outcome) = drive_run(sub, &NullSink, RunState::new()).await;
        // First terminal wins; the late run_error never re-resolves.
        assert!(outcome.success);
        assert_eq!(outcome.data, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_drive_run_maps_transport_error_to_failure() {
        let (tx, sub) = EventSubscription::pair();
        tx.send(ChannelSignal::Event(RunEvent::started("r1")))
            .await
            .unwrap();
        tx.send(ChannelSignal::TransportError("connection reset".into()))
            .await
            .unwrap();

        let (state, outcome) = drive_run(sub, &NullSink, RunState::new()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("connection reset"));
        assert_eq!(state.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_drive_run_maps_early_close_to_failure() {
        let (tx, sub) = EventSubscription::pair();
        tx.send(ChannelSignal::Event(RunEvent::started("r1")))
            .await
            .unwrap();
        tx.send(ChannelSignal::Closed).await.unwrap();

        let (_, outcome) = drive_run(sub, &NullSink, RunState::new()).await;
        assert!(!outcome.success);
        assert_eq!(
            outcome.error.as_deref(),
            Some("run cancelled before completion")
        );
    }

    #[tokio::test]
    async fn test_drive_run_ignores_transport_error_after_terminal() {
        let (tx, sub) = EventSubscription::pair();
        tx.send(ChannelSignal::Event(RunEvent::finished(None)))
            .await
            .unwrap();
        drop(tx);

        let (_, outcome) = drive_run(sub, &NullSink, RunState::new()).await;
        assert!(outcome.success);
    }

    #[test]
    fn test_outcome_from_non_terminal_state_fails() {
        let outcome = outcome_from_state(&RunState::new());
        assert!(!outcome.success);
    }
}
