//! turan-hw - Homework assessment and reward service
//!
//! Accepts recorded homework readings, scores them against the lesson's
//! expected text, routes doubtful results to teachers, and pays out coins.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use turan_common::config::{self, RootFolderResolver};
use turan_hw::services::scoring::{HttpTranscriber, Transcriber, UnconfiguredTranscriber};
use turan_hw::services::SweepIntervals;
use turan_hw::Assembly;

const MODULE_NAME: &str = "turan-hw";
const DEFAULT_PORT: u16 = 5780;

/// Transport ceiling for transcription requests; attempts also time out individually
const TRANSCRIPTION_REQUEST_CEILING: Duration = Duration::from_secs(120);

/// Command-line arguments for turan-hw
#[derive(Parser, Debug)]
#[command(name = "turan-hw")]
#[command(about = "Homework assessment and reward service")]
#[command(version)]
struct Args {
    /// Root folder holding the database and stored audio
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Bootstrap TOML file
    #[arg(short, long, env = "TURAN_HW_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the TOML value)
    #[arg(short, long, env = "TURAN_HW_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config::default_config_path(MODULE_NAME));
    let toml_config = config::load_toml_config(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    // RUST_LOG wins over the TOML level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&toml_config.logging.level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting turan-hw (homework assessment) v{}", env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new(MODULE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_toml(&toml_config)
        .resolve();
    config::ensure_root_folder(&root_folder).context("Failed to initialize root folder")?;
    info!("Root folder: {}", root_folder.display());

    let db_path = toml_config.database_path_or(&root_folder);
    info!("Database: {}", db_path.display());
    let db = turan_common::db::init_database(&db_path)
        .await
        .context("Failed to open database")?;

    let transcriber: Arc<dyn Transcriber> = match &toml_config.transcription.endpoint {
        Some(endpoint) => {
            info!("Transcription endpoint: {}", endpoint);
            Arc::new(HttpTranscriber::new(
                endpoint.clone(),
                toml_config.transcription.api_key.clone(),
                TRANSCRIPTION_REQUEST_CEILING,
            )?)
        }
        None => {
            warn!("No transcription endpoint configured; submissions go to manual review");
            Arc::new(UnconfiguredTranscriber)
        }
    };

    let assembly = Assembly::new(db, &root_folder, transcriber, SweepIntervals::default()).await?;
    let cancel = CancellationToken::new();
    let (state, tasks) = assembly.start(cancel.clone()).await?;

    let app = turan_hw::build_router(state);

    let port = args.port.or(toml_config.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await
        .context("Server error")?;

    cancel.cancel();
    if let Err(e) = tasks.scoring.await {
        warn!("Scoring pool ended abnormally: {}", e);
    }
    if let Err(e) = tasks.scheduler.await {
        warn!("Sweep scheduler ended abnormally: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolve on Ctrl+C or SIGTERM, cancelling background work
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
        _ = cancel.cancelled() => {}
    }
    cancel.cancel();
}
