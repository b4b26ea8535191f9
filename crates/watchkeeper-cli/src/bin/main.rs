//! Watchkeeper entry point
//!
//! Host and service monitoring engine with an external command file and an
//! HTTP status API.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use watchkeeper_cli::command_file::{self, DEFAULT_POLL_INTERVAL};
use watchkeeper_cli::handler::{create_router, AppState};
use watchkeeper_cli::logging;
use watchkeeper_core::clock::SystemClock;
use watchkeeper_core::config::{DelegateKind, EngineConfig, ObjectConfig};
use watchkeeper_core::delegate::{ConnectorDelegate, ExecutionDelegate, ProcessDelegate};
use watchkeeper_core::engine::{Engine, EngineContext, EngineHandle};
use watchkeeper_core::telemetry::EngineMetrics;
use watchkeeper_core::Registry;

#[derive(Parser)]
#[command(name = "watchkeeper")]
#[command(about = "Watchkeeper - host and service monitoring engine")]
#[command(version)]
struct Cli {
    /// Engine configuration file (JSON/TOML/YAML)
    #[arg(short, long, env = "WATCHKEEPER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine until interrupted
    Run {
        /// Object definitions file (hosts, services, contacts, ...)
        #[arg(short, long, env = "WATCHKEEPER_OBJECTS")]
        objects: PathBuf,
    },

    /// Validate configuration and object definitions, then exit
    Validate {
        /// Object definitions file
        #[arg(short, long)]
        objects: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Run { objects } => {
            logging::init(config.log_format);
            run(config, objects).await?;
        }

        Commands::Validate { objects } => {
            let registry = load_objects(&objects)?;
            println!(
                "{}",
                serde_json::json!({
                    "valid": true,
                    "hosts": registry.host_count(),
                    "services": registry.service_count(),
                })
            );
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

fn load_objects(path: &Path) -> anyhow::Result<Registry> {
    let registry = ObjectConfig::from_file(path)
        .and_then(ObjectConfig::into_registry)
        .with_context(|| format!("Invalid object definitions in {}", path.display()))?;
    Ok(registry)
}

async fn run(config: EngineConfig, objects: PathBuf) -> anyhow::Result<()> {
    let registry = load_objects(&objects)?;
    let metrics = EngineMetrics::new()?;
    let context = EngineContext::with_metrics(config.clone(), registry, metrics.clone())?;
    let (engine, handle) = Engine::new(context, Arc::new(SystemClock));

    let mut connector = None;
    let delegate: Arc<dyn ExecutionDelegate> = match config.delegate {
        DelegateKind::Process => Arc::new(ProcessDelegate::new(handle.result_sink())),
        DelegateKind::Connector => {
            let command = config
                .connector_command
                .as_deref()
                .context("connector_command is required for the connector delegate")?;
            let delegate = Arc::new(ConnectorDelegate::spawn(command, handle.result_sink())?);
            connector = Some(Arc::clone(&delegate));
            delegate
        }
    };

    tracing::info!(
        version = watchkeeper_core::VERSION,
        objects = %objects.display(),
        delegate = ?config.delegate,
        "Starting Watchkeeper"
    );
    let engine_task = tokio::spawn(engine.run(delegate));

    if let Some(path) = config.command_file.clone() {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(err) = command_file::follow(&path, handle, DEFAULT_POLL_INTERVAL).await {
                tracing::error!(error = %err, "Command file reader stopped");
            }
        });
    }

    if let Some(listen) = config.http_listen.as_deref() {
        let addr: SocketAddr = listen
            .parse()
            .with_context(|| format!("Invalid http_listen address '{}'", listen))?;
        let router = create_router(Arc::new(AppState::new(handle.clone(), metrics)));
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(%addr, "HTTP API listening");
        tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, router).await {
                tracing::error!(error = %err, "HTTP server stopped");
            }
        });
    }

    wait_for_shutdown(&handle, &objects).await?;

    handle.shutdown().await?;
    engine_task.await?;
    if let Some(connector) = connector {
        connector.quit()?;
    }
    tracing::info!("Watchkeeper stopped");
    Ok(())
}

/// Serve reload requests (SIGHUP) until interrupted
#[cfg(unix)]
async fn wait_for_shutdown(handle: &EngineHandle, objects: &Path) -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = signal(SignalKind::hangup())?;
    let mut terminate = signal(SignalKind::terminate())?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            _ = terminate.recv() => return Ok(()),
            _ = hangup.recv() => reload(handle, objects).await,
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_handle: &EngineHandle, _objects: &Path) -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

#[cfg(unix)]
async fn reload(handle: &EngineHandle, objects: &Path) {
    tracing::info!(objects = %objects.display(), "Reloading object definitions");
    let registry = match load_objects(objects) {
        Ok(registry) => registry,
        Err(err) => {
            tracing::error!(error = %err, "Reload aborted, keeping current objects");
            return;
        }
    };
    if let Err(err) = handle.reload(registry).await {
        tracing::error!(error = %err, "Reload rejected");
    }
}
