// Codeforge Gateway - Main Entry Point
//
// Runs the request gateway in front of the code-generation backend:
// - HTTP surface for generation and registration
// - Config hot reload
// - Quota window resets
// - Optional Prometheus scrape server

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codeforge_gateway::backend::HttpBackend;
use codeforge_gateway::config::{Config, ConfigStore, LoggingConfig};
use codeforge_gateway::registry::{
    spawn_replenisher, spawn_store_writer, FileTokenStore, MemoryTokenStore, TokenRegistry,
    TokenStore,
};
use codeforge_gateway::text::BlockFormatter;
use codeforge_gateway::{logging, metrics, metrics_server, server, RequestPipeline};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Codeforge: code-generation request gateway
#[derive(Parser, Debug)]
#[command(name = "codeforge")]
#[command(version)]
#[command(about = "Request gateway with token auth, per-token quota and config hot reload", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the configuration file (JSON or TOML)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the gateway
    Serve {
        /// Keep tokens in memory only
        #[arg(long)]
        ephemeral: bool,
    },
    /// Register an email and print its token
    Register {
        /// Email address to register
        email: String,
    },
    /// Load and validate the configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The first load is fatal
    let store = match ConfigStore::open(&args.config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            logging::init(&LoggingConfig::default(), args.verbose);
            error!(kind = e.kind(), error = %e, "Failed to load configuration");
            return Err(e).context("Failed to load configuration");
        }
    };
    let config = store.current_snapshot();
    logging::init(&config.logging, args.verbose);

    match args.command {
        Commands::Serve { ephemeral } => serve(store, ephemeral).await,
        Commands::Register { email } => register(&config, &email).await,
        Commands::CheckConfig => {
            println!("Configuration OK: {}", args.config.display());
            println!("  listen:  {}", config.bind_addr());
            println!("  backend: {}", config.backend.url);
            println!(
                "  quota:   {} per {}s ({})",
                config.quota.default_limit,
                config.quota.window_secs,
                if config.quota.enabled { "enabled" } else { "disabled" }
            );
            Ok(())
        }
    }
}

fn token_store(config: &Config, ephemeral: bool) -> Arc<dyn TokenStore> {
    if ephemeral {
        Arc::new(MemoryTokenStore::new())
    } else {
        Arc::new(FileTokenStore::new(&config.token_path))
    }
}

/// Run the gateway until ctrl-c
async fn serve(store: Arc<ConfigStore>, ephemeral: bool) -> Result<()> {
    let config = store.current_snapshot();
    info!("Codeforge gateway v{} starting...", env!("CARGO_PKG_VERSION"));

    metrics::init().context("Failed to initialize metrics")?;

    let registry = TokenRegistry::load(token_store(&config, ephemeral), config.quota.default_limit)
        .await
        .context("Failed to load token store")?;
    let registry = Arc::new(registry);
    info!(tokens = registry.len(), ephemeral, "Token registry loaded");

    let backend = HttpBackend::new(config.backend.url.clone())
        .context("Failed to create backend client")?;

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;

    let metrics_port = config.metrics.enabled.then_some(config.metrics.port);
    let cancel = CancellationToken::new();

    let refresh = store.spawn_refresh(cancel.clone());
    let replenisher = spawn_replenisher(registry.clone(), store.clone(), cancel.clone());
    let writer = spawn_store_writer(registry.clone(), store.clone(), cancel.clone());

    let metrics_task = metrics_port.map(|port| {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = metrics_server::start_metrics_server(port, cancel).await {
                error!("Metrics server failed: {:#}", e);
            }
        })
    });

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for ctrl-c: {}", e);
            return;
        }
        info!("Shutdown requested");
        shutdown.cancel();
    });

    let pipeline = RequestPipeline::new(
        registry,
        Arc::new(backend),
        Arc::new(BlockFormatter::new()),
        store,
    );
    let result = server::serve(listener, pipeline, cancel.clone()).await;

    cancel.cancel();
    let _ = refresh.await;
    let _ = replenisher.await;
    let _ = writer.await;
    if let Some(task) = metrics_task {
        let _ = task.await;
    }

    result
}

/// Register `email` against the on-disk token store
///
/// A running server picks the new token up on its next store sync.
async fn register(config: &Config, email: &str) -> Result<()> {
    let registry = TokenRegistry::load(token_store(config, false), config.quota.default_limit)
        .await
        .context("Failed to load token store")?;

    match registry.register(email).await {
        Ok(token) => {
            println!("{}", token);
            Ok(())
        }
        Err(e) => {
            error!(kind = e.kind(), error = %e, "Registration failed");
            Err(e.into())
        }
    }
}
