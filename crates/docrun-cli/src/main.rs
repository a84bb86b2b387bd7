//! Docrun CLI - drive document-processing runs from the command line.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use docrun_batch::{BatchHandler, BatchOptions, BatchProcessor, JsonReportWriter};
use docrun_client::{AgentInput, ChannelSink, ClientConfig, DocumentFile, RunClient};
use docrun_core::{AgentType, BatchItem, BatchProgress, ItemStatus, RunEvent};

/// Docrun CLI - document-processing run tool
#[derive(Parser)]
#[command(name = "docrun")]
#[command(about = "CLI for document-processing runs", long_about = None)]
struct Cli {
    /// Backend base URL (falls back to DOCRUN_BASE_URL)
    #[arg(long)]
    base_url: Option<String>,

    /// API key (falls back to DOCRUN_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Bearer token for an authenticated user
    #[arg(long)]
    token: Option<String>,

    /// Resolve from the trigger response instead of the event stream
    #[arg(long)]
    no_stream: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute one file through a capability
    Run {
        /// Capability identifier (e.g. field-extractor)
        #[arg(short, long)]
        agent: String,

        /// Input file
        file: PathBuf,

        /// Prompt forwarded to the capability
        #[arg(short, long)]
        prompt: Option<String>,

        /// Required field names, comma separated
        #[arg(long)]
        fields: Option<String>,
    },

    /// Process several files through one capability, in order
    Batch {
        /// Capability identifier (e.g. field-extractor)
        #[arg(short, long)]
        agent: String,

        /// Input files, processed in submission order
        files: Vec<PathBuf>,

        /// Prompt forwarded to the capability
        #[arg(short, long)]
        prompt: Option<String>,

        /// Required field names, comma separated
        #[arg(long)]
        fields: Option<String>,

        /// Per-item timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Items in flight at once (1 = strictly sequential)
        #[arg(long, default_value_t = 1)]
        concurrency: usize,

        /// Write a JSON report to this path when done
        #[arg(long)]
        export: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();

    let mut config = ClientConfig::from_env();
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url.trim_end_matches('/').to_string();
    }
    if let Some(api_key) = cli.api_key {
        config.api_key = Some(api_key);
    }
    if let Some(token) = cli.token {
        config.auth_token = Some(token);
    }

    info!(base_url = %config.base_url, "Using backend");

    let mut client = RunClient::new(config);
    if !cli.no_stream {
        client = client.with_sse_channel();
    }

    match cli.command {
        Commands::Run {
            agent,
            file,
            prompt,
            fields,
        } => run_single(client, agent, file, prompt, fields).await,
        Commands::Batch {
            agent,
            files,
            prompt,
            fields,
            timeout_secs,
            concurrency,
            export,
        } => {
            run_batch(
                client,
                agent,
                files,
                prompt,
                fields,
                timeout_secs,
                concurrency,
                export,
            )
            .await
        }
    }
}

async fn run_single(
    client: RunClient,
    agent: String,
    file: PathBuf,
    prompt: Option<String>,
    fields: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent = AgentType::from(agent);
    let document = DocumentFile::from_path(&file).await?;
    info!(file = %file.display(), agent = %agent, "Starting run");

    let mut input = AgentInput::new();
    if let Some(prompt) = prompt {
        input = input.with_prompt(prompt);
    }
    if let Some(fields) = fields {
        input = input.with_required_fields(split_fields(&fields));
    }

    let (sink, mut events) = ChannelSink::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let Some(line) = describe_event(&event) {
                info!("{}", line);
            }
        }
    });

    let outcome = client
        .execute(&agent, input.with_document(document), Arc::new(sink))
        .await?;
    printer.await.ok();

    if outcome.success {
        let data = outcome.data.unwrap_or(serde_json::Value::Null);
        println!("{}", serde_json::to_string_pretty(&data)?);
        Ok(())
    } else {
        error!(
            error = %outcome.error.as_deref().unwrap_or("unknown"),
            "Run failed"
        );
        std::process::exit(1);
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_batch(
    client: RunClient,
    agent: String,
    files: Vec<PathBuf>,
    prompt: Option<String>,
    fields: Option<String>,
    timeout_secs: Option<u64>,
    concurrency: usize,
    export: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let agent = AgentType::from(agent);

    let mut documents = Vec::with_capacity(files.len());
    for path in &files {
        documents.push(DocumentFile::from_path(path).await?);
    }

    let options = BatchOptions {
        prompt,
        required_fields: fields.as_deref().map(split_fields),
        format: None,
        item_timeout: timeout_secs.map(Duration::from_secs),
        concurrency,
    };

    let mut processor =
        BatchProcessor::with_handler(Arc::new(client), Arc::new(CliBatchHandler));
    processor.process_files(documents, agent, options).await;

    if let Some(message) = processor.error() {
        error!("{}", message);
        std::process::exit(1);
    }

    println!(
        "{} processed, {} succeeded, {} failed",
        processor.results().len(),
        processor.success_count(),
        processor.error_count()
    );

    if let Some(path) = export {
        let written = processor
            .export_results(&JsonReportWriter, Some(path))
            .await?;
        println!("report written to {}", written.display());
    }

    Ok(())
}

fn split_fields(fields: &str) -> Vec<String> {
    fields
        .split(',')
        .map(|field| field.trim().to_string())
        .filter(|field| !field.is_empty())
        .collect()
}

fn describe_event(event: &RunEvent) -> Option<String> {
    match event {
        RunEvent::RunStarted { .. } => Some("run started".to_string()),
        RunEvent::Progress { data, .. } => data.as_ref().map(|data| {
            format!(
                "[{:>3}%] {}",
                data.progress.unwrap_or(0),
                data.message.as_deref().unwrap_or("")
            )
        }),
        RunEvent::RunFinished { .. } => Some("run finished".to_string()),
        RunEvent::RunError { data, .. } => Some(format!(
            "run error: {}",
            data.as_ref()
                .and_then(|d| d.error.as_deref())
                .unwrap_or("unknown")
        )),
        // Chunks and unknown events stay quiet on the console.
        _ => None,
    }
}

/// Prints batch progress to the console.
struct CliBatchHandler;

#[async_trait::async_trait]
impl BatchHandler for CliBatchHandler {
    async fn on_progress(&self, progress: &BatchProgress) {
        info!(
            "[{}/{}] {} ({}%)",
            progress.current, progress.total, progress.current_file, progress.percentage
        );
    }

    async fn on_item_settled(&self, item: &BatchItem) {
        match item.status {
            ItemStatus::Success => info!(
                file = %item.file_name,
                elapsed_ms = item.processing_time_ms.unwrap_or(0),
                "ok"
            ),
            _ => warn!(
                file = %item.file_name,
                error = %item.error.as_deref().unwrap_or("unknown"),
                "failed"
            ),
        }
    }

    async fn on_complete(&self, items: &[BatchItem]) {
        info!(total = items.len(), "Batch complete");
    }

    async fn on_error(&self, message: &str) {
        error!("{}", message);
    }
}
