use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use doc_pipeline_core::{
    DispatchMode, DocumentStatus, DocumentStore, EventOrchestrator, InMemoryBus, InMemoryDocumentStore,
    InMemorySearchBackend, IngestionCoordinator, OpenSearchBackend, PipelineConfig,
    PollingOrchestrator, Principal, ProcessingPipeline, SearchBackend, SearchSynchronizer,
    StatusPropagator, SummaryCache, UploadMetadata,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "doc-pipeline", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// OpenSearch base URL; without it the in-process index is used.
    #[arg(long)]
    opensearch_url: Option<String>,

    /// OpenSearch index name
    #[arg(long, default_value = "documents")]
    opensearch_index: String,

    /// Directory uploaded files are stored under
    #[arg(long, default_value = "uploads")]
    upload_dir: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    /// Chunked polling sweeps over Pending documents.
    Polling,
    /// Event-driven consumers, one per lifecycle topic.
    Messaging,
}

#[derive(Subcommand)]
enum Command {
    /// Upload files (or folders, recursively), process them with the
    /// chosen strategy, and report the terminal status of each.
    Run {
        /// Files or folders to upload.
        #[arg(long, required = true)]
        input: Vec<String>,

        #[arg(long, value_enum, default_value = "polling")]
        strategy: Strategy,

        /// Document type recorded for every upload.
        #[arg(long)]
        document_type: Option<String>,

        /// Keywords attached to every upload.
        #[arg(long)]
        keyword: Vec<String>,

        /// Display name of the uploading user.
        #[arg(long, default_value = "cli-user")]
        owner: String,

        /// Search query to run once processing settles.
        #[arg(long)]
        query: Option<String>,
    },
}

fn discover_files(inputs: &[String]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for input in inputs {
        let path = Path::new(input);
        if path.is_file() {
            files.push(path.to_path_buf());
            continue;
        }
        for entry in WalkDir::new(path).into_iter().filter_map(|item| item.ok()) {
            if entry.file_type().is_file() {
                files.push(entry.path().to_path_buf());
            }
        }
    }
    files.sort_unstable();
    files
}

fn declared_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .as_deref()
    {
        Some("pdf") => "application/pdf",
        Some("doc") | Some("docx") => "application/msword",
        Some("txt") | Some("md") | Some("log") | Some("csv") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let store = Arc::new(InMemoryDocumentStore::new());
    let cache = Arc::new(SummaryCache::new());
    let bus = Arc::new(InMemoryBus::new());

    let backend: Arc<dyn SearchBackend> = match &cli.opensearch_url {
        Some(url) => {
            let opensearch = OpenSearchBackend::new(url, &cli.opensearch_index);
            opensearch
                .ensure_index()
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            Arc::new(opensearch)
        }
        None => Arc::new(InMemorySearchBackend::new()),
    };

    let synchronizer = Arc::new(SearchSynchronizer::new(
        backend,
        store.clone(),
        cache.clone(),
    ));
    let propagator = Arc::new(StatusPropagator::new(bus.clone()));
    let pipeline = Arc::new(ProcessingPipeline::new(
        store.clone(),
        synchronizer.clone(),
        propagator.clone(),
        cache.clone(),
    ));

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-pipeline boot"
    );

    match cli.command {
        Command::Run {
            input,
            strategy,
            document_type,
            keyword,
            owner,
            query,
        } => {
            let files = discover_files(&input);
            if files.is_empty() {
                anyhow::bail!("no files found under the given inputs");
            }

            let config = PipelineConfig {
                upload_dir: PathBuf::from(&cli.upload_dir),
                dispatch_mode: match strategy {
                    Strategy::Polling => DispatchMode::Batch,
                    Strategy::Messaging => DispatchMode::Messaging,
                },
                poll_interval: Duration::from_millis(200),
                ..PipelineConfig::default()
            };

            let (wake_tx, wake_rx) = tokio::sync::mpsc::unbounded_channel();

            let mut consumer_handles = Vec::new();
            match strategy {
                Strategy::Polling => {
                    let polling = PollingOrchestrator::new(
                        pipeline.clone(),
                        store.clone(),
                        config.chunk_size,
                        config.worker_width,
                        config.poll_interval,
                    );
                    consumer_handles.push(tokio::spawn(polling.run(wake_rx)));
                }
                Strategy::Messaging => {
                    let events = EventOrchestrator::new(
                        pipeline.clone(),
                        propagator.clone(),
                        bus.clone(),
                        config.redelivery_delay,
                    );
                    consumer_handles.extend(events.spawn().await.map_err(|error| {
                        anyhow::anyhow!("starting consumers failed: {error}")
                    })?);
                }
            }

            let wake = matches!(strategy, Strategy::Polling).then(|| wake_tx.clone());
            let coordinator = IngestionCoordinator::new(
                store.clone(),
                synchronizer.clone(),
                cache.clone(),
                propagator.clone(),
                config,
                wake,
            );

            let principal = Principal {
                user_id: uuid_for_owner(&owner),
                display_name: owner.clone(),
            };

            let mut uploaded = Vec::new();
            for file in &files {
                let bytes = tokio::fs::read(file).await?;
                let file_name = file
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("upload.bin");
                let metadata = UploadMetadata {
                    title: file_name.to_string(),
                    description: String::new(),
                    language: String::new(),
                    document_type: document_type.clone(),
                    keywords: keyword.clone(),
                };

                match coordinator
                    .upload(
                        &bytes,
                        file_name,
                        declared_content_type(file),
                        metadata,
                        Some(&principal),
                    )
                    .await
                {
                    Ok(document) => {
                        info!(document_id = %document.id, file = %file.display(), "uploaded");
                        uploaded.push(document.id);
                    }
                    Err(error) => warn!(file = %file.display(), %error, "upload failed"),
                }
            }

            // Uploads return at the Pending commit; wait for the
            // orchestrator to drain them to a terminal state.
            let deadline = tokio::time::Instant::now() + Duration::from_secs(60);
            loop {
                let mut terminal = 0;
                for id in &uploaded {
                    if let Some(document) = store.find_by_id(*id).await.ok().flatten() {
                        if document.status.is_terminal() {
                            terminal += 1;
                        }
                    }
                }
                if terminal == uploaded.len() {
                    break;
                }
                if tokio::time::Instant::now() > deadline {
                    warn!("processing did not settle within 60s, reporting as-is");
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }

            for id in &uploaded {
                if let Some(document) = store.find_by_id(*id).await.ok().flatten() {
                    match document.status {
                        DocumentStatus::Failed => println!(
                            "{} {} status={} error={}",
                            document.id,
                            document.file_name,
                            document.status,
                            document.error_message.as_deref().unwrap_or("-"),
                        ),
                        _ => println!(
                            "{} {} status={} pages={} chars={}",
                            document.id,
                            document.file_name,
                            document.status,
                            document
                                .page_count
                                .map(|count| count.to_string())
                                .unwrap_or_else(|| "-".to_string()),
                            document.content.chars().count(),
                        ),
                    }
                }
            }

            if let Some(query) = query {
                let hits = synchronizer
                    .search(&query, &principal)
                    .await
                    .map_err(|error| anyhow::anyhow!(error.to_string()))?;
                println!("query: {query}");
                for hit in hits {
                    println!(
                        "  {} {} status={} uploaded_at={}",
                        hit.id,
                        hit.file_name,
                        hit.status,
                        hit.uploaded_at.to_rfc3339()
                    );
                }
            }

            for handle in consumer_handles {
                handle.abort();
            }
        }
    }

    Ok(())
}

/// Stable per-owner id so repeated runs against a live index stay
/// scoped to the same user.
fn uuid_for_owner(owner: &str) -> uuid::Uuid {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, owner.as_bytes())
}
