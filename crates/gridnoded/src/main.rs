//! gridnoded — the GridNode daemon.
//!
//! Single binary that assembles a grid node:
//! - Durable store (redb)
//! - Object store, model manager and model cache
//! - Command relay with snapshot recovery
//! - Node registry and startup peers
//! - HTTP routes + WebSocket event channel
//!
//! # Usage
//!
//! ```text
//! gridnoded run --port 5000 --data-dir /var/lib/gridnode --id alice
//! gridnoded run --config /etc/gridnode/node.toml
//! gridnoded default-config > node.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use gridnode_api::{ApiState, build_router};
use gridnode_cluster::{GrpcConnector, NodeRegistry};
use gridnode_core::{JsonCodec, NodeConfig};
use gridnode_models::{DenseEngine, ModelManager, ObjectStore};
use gridnode_relay::{CommandRelay, ObjectCommandEngine};
use gridnode_state::StateStore;

const DEFAULT_LOG_FILTER: &str = "info,gridnoded=debug,gridnode=debug";

#[derive(Parser)]
#[command(name = "gridnoded", about = "GridNode daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the node.
    Run {
        /// TOML config file. Flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on.
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for persistent state.
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Grid id for this node. Marks it as a server node.
        #[arg(long)]
        id: Option<String>,
    },
    /// Print the default config as TOML.
    DefaultConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            data_dir,
            id,
        } => {
            let mut config = match config {
                Some(path) => NodeConfig::from_file(&path)?,
                None => NodeConfig::default(),
            };
            if let Some(port) = port {
                config.node.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.node.data_dir = data_dir;
            }
            if id.is_some() {
                config.node.id = id;
            }
            init_tracing(&config);
            run_node(config).await
        }
        Command::DefaultConfig => {
            print!("{}", NodeConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over the config file, which wins over the built-in filter.
fn init_tracing(config: &NodeConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| {
            tracing_subscriber::EnvFilter::try_new(
                config.log_filter().unwrap_or(DEFAULT_LOG_FILTER),
            )
        })
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER));

    if config.log_json() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn run_node(config: NodeConfig) -> anyhow::Result<()> {
    info!("GridNode starting");

    // Ensure data directory exists.
    std::fs::create_dir_all(&config.node.data_dir)?;
    let db_path = config.node.data_dir.join("gridnode.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = Arc::new(StateStore::open(&db_path)?);
    info!(path = ?db_path, "state store opened");

    // One object store, shared by the model manager and the relay.
    let objects = ObjectStore::new();

    let models = Arc::new(ModelManager::new(
        store.clone(),
        objects.clone(),
        Arc::new(JsonCodec),
    ));
    info!("model manager initialized");

    let relay = Arc::new(CommandRelay::new(
        objects,
        Arc::new(ObjectCommandEngine),
        store,
    ));
    let restored = relay.recover()?;
    info!(restored, "command relay initialized");

    let mut connector = GrpcConnector::new();
    if let Some(secs) = config.connect_timeout_secs() {
        connector = connector.with_connect_timeout(Duration::from_secs(secs));
    }
    let registry = Arc::new(NodeRegistry::new(connector));
    if let Some(id) = &config.node.id {
        registry.set_node_id(id);
    }

    // ── Startup peers ──────────────────────────────────────────

    for peer in &config.peers {
        if let Err(e) = registry.connect_node(&peer.id, &peer.uri).await {
            warn!(peer = %peer.id, error = %e, "startup peer unreachable");
        }
    }

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState {
        models,
        relay,
        registry,
        inference: Arc::new(DenseEngine),
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.node.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await?;

    info!("GridNode stopped");
    Ok(())
}
