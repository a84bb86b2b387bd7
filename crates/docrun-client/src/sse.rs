//! Server-sent event adapter for the event channel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use docrun_core::{RunEvent, RunId};

use crate::channel::{ChannelSignal, EventChannel, EventSubscription, SIGNAL_BUFFER};
use crate::config::ClientConfig;
use crate::error::ClientError;

/// Event channel over an HTTP server-sent event endpoint.
///
/// Each subscription issues one GET to `{base_url}{events_path}?runId=...`
/// and decodes the line-delimited frames into [`RunEvent`]s on a reader
/// task. Subscriptions are tracked per run id so they can be closed
/// individually (the cancellation primitive) or all at once.
pub struct SseChannel {
    http: reqwest::Client,
    base_url: String,
    events_path: String,
    bearer: Option<String>,
    active: Arc<Mutex<HashMap<String, ActiveSubscription>>>,
}

struct ActiveSubscription {
    tx: mpsc::Sender<ChannelSignal>,
    task: JoinHandle<()>,
}

impl SseChannel {
    /// Create a channel from client configuration.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            events_path: config.events_path.clone(),
            bearer: config.bearer_token().map(str::to_owned),
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn stream_url(&self, run_id: &RunId) -> String {
        format!(
            "{}{}?runId={}",
            self.base_url, self.events_path, run_id
        )
    }
}

#[async_trait]
impl EventChannel for SseChannel {
    async fn subscribe(&self, run_id: &RunId) -> Result<EventSubscription, ClientError> {
        // A second subscription for the same run replaces the first.
        self.close(run_id).await;

        let (tx, rx) = mpsc::channel(SIGNAL_BUFFER);
        let url = self.stream_url(run_id);
        debug!(run_id = %run_id, url = %url, "Opening event stream");

        let task = tokio::spawn(read_stream(
            self.http.clone(),
            url,
            self.bearer.clone(),
            tx.clone(),
            self.active.clone(),
            run_id.as_str().to_owned(),
        ));

        self.active
            .lock()
            .await
            .insert(run_id.as_str().to_owned(), ActiveSubscription { tx, task });

        Ok(EventSubscription::new(rx))
    }

    async fn close(&self, run_id: &RunId) {
        let sub = self.active.lock().await.remove(run_id.as_str());
        if let Some(sub) = sub {
            debug!(run_id = %run_id, "Closing event stream");
            sub.tx.send(ChannelSignal::Closed).await.ok();
            sub.task.abort();
        }
    }

    async fn close_all(&self) {
        let subs: Vec<_> = self.active.lock().await.drain().collect();
        for (run_id, sub) in subs {
            debug!(run_id = %run_id, "Closing event stream");
            sub.tx.send(ChannelSignal::Closed).await.ok();
            sub.task.abort();
        }
    }
}

/// Reader task: one GET, frames decoded from the body as they arrive.
async fn read_stream(
    http: reqwest::Client,
    url: String,
    bearer: Option<String>,
    tx: mpsc::Sender<ChannelSignal>,
    active: Arc<Mutex<HashMap<String, ActiveSubscription>>>,
    run_id: String,
) {
    let mut request = http.get(&url).header("Accept", "text/event-stream");
    if let Some(token) = &bearer {
        request = request.bearer_auth(token);
    }

    match request.send().await {
        Ok(response) if response.status().is_success() => {
            if tx.send(ChannelSignal::Opened).await.is_err() {
                active.lock().await.remove(&run_id);
                return;
            }

            let mut stream = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(frame) = extract_frame(&mut buffer) {
                            if let Some(event) = frame {
                                if tx.send(ChannelSignal::Event(event)).await.is_err() {
                                    // Receiver gone; stop reading.
                                    active.lock().await.remove(&run_id);
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        warn!(run_id = %run_id, error = %e, "Event stream dropped");
                        tx.send(ChannelSignal::TransportError(e.to_string()))
                            .await
                            .ok();
                        active.lock().await.remove(&run_id);
                        return;
                    }
                }
            }

            tx.send(ChannelSignal::Closed).await.ok();
        }
        Ok(response) => {
            let status = response.status();
            warn!(run_id = %run_id, status = %status, "Event stream rejected");
            tx.send(ChannelSignal::TransportError(format!(
                "event stream rejected with HTTP {}",
                status
            )))
            .await
            .ok();
        }
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "Failed to open event stream");
            tx.send(ChannelSignal::TransportError(e.to_string()))
                .await
                .ok();
        }
    }

    active.lock().await.remove(&run_id);
}

/// Extract one complete frame from the buffer.
///
/// Returns `Some(Some(event))` when a frame decoded to an event,
/// `Some(None)` for comments, empty frames, and undecodable payloads
/// (skipped, never fatal), and `None` while the buffer holds no complete
/// frame yet.
fn extract_frame(buffer: &mut String) -> Option<Option<RunEvent>> {
    let end = buffer.find("\n\n")?;
    let frame = buffer[..end].to_string();
    buffer.drain(..=end + 1);

    if frame.is_empty() || frame.starts_with(':') {
        return Some(None);
    }

    let mut data = String::new();
    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(value.strip_prefix(' ').unwrap_or(value));
        }
    }

    // Some backends wrap the payload in a second data: prefix.
    let payload = data.strip_prefix("data: ").unwrap_or(&data);
    if payload.is_empty() {
        return Some(None);
    }

    match serde_json::from_str::<RunEvent>(payload) {
        Ok(event) => Some(Some(event)),
        Err(e) => {
            let preview: String = payload.chars().take(120).collect();
            warn!(error = %e, preview = %preview, "Failed to decode event frame");
            Some(None)
        }
    }
}
