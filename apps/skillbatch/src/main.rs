mod config;
mod control;
mod errors;
mod extraction;
mod models;
mod pipeline;
mod routes;
mod source;
mod state;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::extraction::{SkillClient, SkillExtractor};
use crate::pipeline::artifacts::ArtifactStore;
use crate::pipeline::runner::BatchRunner;
use crate::pipeline::supervisor::{StartOutcome, Supervisor};
use crate::routes::build_router;
use crate::source::SourceReader;
use crate::state::AppState;

#[derive(Parser)]
#[command(name = "skillbatch")]
#[command(about = "Batch skill extraction over a vacancy spreadsheet")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the control API (default)
    Serve,

    /// Run the batch extraction in the foreground
    Process(ProcessArgs),
}

#[derive(Args)]
struct ProcessArgs {
    /// Rows per batch (defaults to BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Start row; defaults to the resume offset of the artifacts directory
    #[arg(long)]
    start_from: Option<usize>,

    /// Stop after this many batches
    #[arg(long)]
    max_batches: Option<usize>,

    /// Source spreadsheet (defaults to SOURCE_PATH)
    #[arg(long)]
    source: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting skillbatch v{}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Process(args) => process(config, args).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    let client = SkillClient::new(&config.extraction_url, config.extraction_timeout)
        .context("Failed to build extraction client")?;
    info!("Extraction client initialized ({})", config.extraction_url);

    let reader = SourceReader::new(config.source_path.clone());
    let store = ArtifactStore::new(config.artifacts_dir.clone());
    store
        .ensure_dir()
        .with_context(|| format!("Cannot create {}", config.artifacts_dir.display()))?;

    let extractor: Arc<dyn SkillExtractor> = Arc::new(client.clone());
    let supervisor = Arc::new(Supervisor::new(
        reader.clone(),
        store.clone(),
        extractor,
        config.runner_settings(),
        config.gap_fill_settings(),
    ));

    if config.auto_start && supervisor.start_processing() == StartOutcome::Started {
        info!("Batch processing started automatically");
    }

    let state = AppState {
        config: config.clone(),
        client,
        reader,
        store,
        supervisor: supervisor.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Stopping background workers");
    supervisor.shutdown().await;
    Ok(())
}

async fn process(config: Config, args: ProcessArgs) -> Result<()> {
    let client = SkillClient::new(&config.extraction_url, config.extraction_timeout)
        .context("Failed to build extraction client")?;

    let mut settings = config.runner_settings();
    if let Some(batch_size) = args.batch_size {
        anyhow::ensure!(batch_size > 0, "--batch-size must be greater than zero");
        settings.batch_size = batch_size;
    }
    settings.start_offset = args.start_from;
    settings.max_batches = args.max_batches;

    let source = args.source.unwrap_or(config.source_path);
    let runner = BatchRunner::new(
        SourceReader::new(source),
        ArtifactStore::new(config.artifacts_dir),
        Arc::new(client),
        settings,
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Interrupt received, finishing the current batch");
        on_signal.cancel();
    });

    let summary = runner.run(cancel).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
