//! HostDeck daemon
//!
//! Wires the installation store, app catalog, container runtime, telemetry
//! loop and HTTP/WebSocket server together.

use clap::Parser;
use hostdeck_server::apps::InstallationManager;
use hostdeck_server::auth::AuthMode;
use hostdeck_server::config::ServerConfig;
use hostdeck_server::runtime::{CliRuntime, ContainerRuntime, NullRuntime, RuntimeKind};
use hostdeck_server::server::{self, AppState};
use hostdeck_server::subscriptions::SubscriptionRegistry;
use hostdeck_server::telemetry::{self, history::MetricsHistory, TelemetryCollector, TelemetryHub};
use hostdeck_common::{AppRegistry, InstallStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hostdeckd")]
#[command(about = "HostDeck daemon - app store, host telemetry and container control")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (installation store, metrics history)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// HTTP listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    info!("HostDeck daemon v{}", env!("CARGO_PKG_VERSION"));

    let config_path = cli
        .config
        .unwrap_or_else(|| hostdeck_common::default_data_dir().join("config.toml"));
    let mut config = ServerConfig::load(&config_path)?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }

    tokio::fs::create_dir_all(&config.data_dir).await?;

    let registry = Arc::new(AppRegistry::builtin());
    let store = InstallStore::open(config.store_path())?;

    let (runtime, runtime_kind): (Arc<dyn ContainerRuntime>, Option<RuntimeKind>) =
        match CliRuntime::detect() {
            Some(engine) => {
                let kind = engine.kind();
                info!("Container runtime: {}", kind.command());
                (Arc::new(engine), Some(kind))
            }
            None => {
                warn!("No container runtime detected; app installs will fail until one is available");
                (Arc::new(NullRuntime), None)
            }
        };

    let manager = InstallationManager::new(
        registry.clone(),
        store,
        runtime.clone(),
        config.runtime_timeout(),
    );

    let subs = Arc::new(SubscriptionRegistry::new());
    let history = MetricsHistory::new(config.metrics_dir(), config.telemetry.history_per_day);
    let hub = Arc::new(TelemetryHub::new(subs.clone(), history));
    let collector = Arc::new(TelemetryCollector::new());

    let collector_task = tokio::spawn(telemetry::run_collector(
        collector.clone(),
        hub.clone(),
        config.collect_interval(),
    ));

    let auth = AuthMode::from_config(&config.auth);
    let state = Arc::new(AppState {
        registry,
        manager,
        collector,
        hub,
        subs,
        runtime,
        runtime_kind,
        auth,
    });

    let addr: SocketAddr = config.listen.parse()?;
    let server_task = tokio::spawn(server::serve(addr, state));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_task => {
            if let Err(e) = result? {
                error!("Server error: {}", e);
            }
        }
        _ = collector_task => {}
    }

    info!("Daemon shutdown complete");
    Ok(())
}
