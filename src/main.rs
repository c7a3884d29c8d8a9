//! Wagerbot binary
//!
//! Reads chat events as JSON lines on stdin and writes outbound messages as
//! JSON lines on stdout. Logs go to stderr.

use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{error, info, warn};
use wagerbot::{
    config::generate_sample_config,
    dispatch::Dispatcher,
    events::LineEventSource,
    gateway::{CachedIdentity, ConsoleGateway, MentionIdentity},
    handler::CommandHandler,
    moderation::ModerationStore,
    status,
    storage::Storage,
    BotResult, ConfigLoader, GameEngine,
};

const IDENTITY_CACHE_SIZE: usize = 4_096;

/// Wagerbot CLI
#[derive(Parser, Debug)]
#[command(name = "wagerbot")]
#[command(about = "Chat mini-games bot with roulette, crash, dream and dice")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory, overrides the configuration file
    #[arg(short, long)]
    data_dir: Option<String>,

    /// Serve the status API on this port
    #[arg(long)]
    status_port: Option<u16>,

    /// Number of command workers
    #[arg(short, long)]
    workers: Option<usize>,

    /// Write a sample configuration to this path and exit
    #[arg(long)]
    generate_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> BotResult<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.generate_config {
        generate_sample_config(&path.to_string_lossy())?;
        println!("Sample configuration written to {}", path.display());
        return Ok(());
    }

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let mut config = loader.load()?;
    if let Some(dir) = cli.data_dir {
        config.storage.data_directory = dir;
    }
    if let Some(port) = cli.status_port {
        config.monitoring.status_port = Some(port);
    }
    if let Some(workers) = cli.workers {
        config.dispatch.workers = workers;
    }
    config.validate()?;

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.monitoring.log_filter.clone().into()),
        )
        .init();

    info!(data_dir = %config.storage.data_directory, workers = config.dispatch.workers, "Starting wagerbot");

    let storage = Storage::new_with_config(&config.storage)?;
    let engine = GameEngine::builder(config.clone(), storage.clone())
        .gateway(Arc::new(ConsoleGateway::new()))
        .identity(Arc::new(CachedIdentity::new(MentionIdentity, IDENTITY_CACHE_SIZE)))
        .build()?;
    engine.recover()?;

    let moderation = Arc::new(ModerationStore::new(
        storage,
        Arc::new(wagerbot::clock::SystemClock),
        config.moderation.clone(),
    ));
    let handler = CommandHandler::new(engine.clone(), moderation);
    let dispatcher = Dispatcher::start(handler, engine.metrics().clone(), &config.dispatch);

    let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
    let status_task = match config.monitoring.status_port {
        Some(port) => {
            let addr: SocketAddr = format!("{}:{}", config.monitoring.status_host, port)
                .parse()
                .map_err(|e| wagerbot::errors::ConfigurationError::InvalidValue {
                    field: "monitoring.status_host".to_string(),
                    value: config.monitoring.status_host.clone(),
                    reason: format!("{}", e),
                })?;
            let mut stop = stop_rx.clone();
            let engine = engine.clone();
            Some(tokio::spawn(async move {
                let shutdown = async move {
                    let _ = stop.wait_for(|stopped| *stopped).await;
                };
                if let Err(e) = status::serve(engine, addr, shutdown).await {
                    error!(error = %e, "Status server failed");
                }
            }))
        }
        None => None,
    };

    let mut source = LineEventSource::stdin();
    tokio::select! {
        pumped = dispatcher.pump(&mut source) => match pumped {
            Ok(count) => info!(count, "Event source exhausted"),
            Err(e) => error!(error = %e, "Event source failed"),
        },
        _ = tokio::signal::ctrl_c() => info!("Interrupt received, shutting down"),
    }

    dispatcher.shutdown().await;
    engine.shutdown();
    let _ = stop_tx.send(true);
    if let Some(task) = status_task {
        if let Err(e) = task.await {
            warn!(error = %e, "Status server task panicked");
        }
    }
    info!("Wagerbot stopped");
    Ok(())
}
