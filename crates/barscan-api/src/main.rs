//! barscan server binary
//!
//! Barcode scan logging service.
//!
//! # Usage
//!
//! ```bash
//! # With config file
//! barscan --config config.yaml
//!
//! # With environment variables only
//! BARSCAN_STORAGE__BACKEND=memory barscan
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};

use barscan_api::http::{create_router_with_observability, AppState};
use barscan_api::observability::{init_logging, init_metrics, MetricsState};
use barscan_server::ServerConfig;
use barscan_storage::{
    MemoryDataStore, PostgresConfig, PostgresDataStore, ScanStore, SqliteConfig, SqliteDataStore,
};

/// barscan - barcode scan logging service
#[derive(Parser, Debug)]
#[command(name = "barscan")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "BARSCAN_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match args.config {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::from_env()?,
    };

    init_logging(&config.logging);
    info!(version = env!("CARGO_PKG_VERSION"), "starting barscan server");

    let metrics_state = init_metrics()?;
    if config.metrics.enabled {
        info!("metrics enabled at /metrics");
    }

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let database_url = config.storage.effective_database_url();

    match config.storage.backend.as_str() {
        "memory" => {
            warn!("using in-memory storage; records are lost on shutdown");
            serve(MemoryDataStore::new_shared(), addr, &config, metrics_state).await
        }
        "sqlite" => {
            let url = database_url
                .ok_or_else(|| anyhow::anyhow!("storage.database_url is required"))?;
            if let Some(dir) = sqlite_parent_dir(&url) {
                tokio::fs::create_dir_all(&dir).await?;
            }

            info!("opening SQLite database");
            let storage = SqliteDataStore::from_config(&SqliteConfig {
                database_url: url,
                max_connections: config.storage.pool_size,
                connect_timeout_secs: config.storage.connection_timeout_secs,
                query_timeout_secs: config.storage.query_timeout_secs,
                ..Default::default()
            })
            .await?;
            storage.run_migrations().await?;
            info!("database migrations complete");

            serve(Arc::new(storage), addr, &config, metrics_state).await
        }
        "postgres" => {
            let url = database_url.ok_or_else(|| {
                anyhow::anyhow!("storage.database_url is required for postgres backend")
            })?;

            info!("connecting to PostgreSQL database");
            let storage = PostgresDataStore::from_config(&PostgresConfig {
                database_url: url,
                max_connections: config.storage.pool_size,
                connect_timeout_secs: config.storage.connection_timeout_secs,
                query_timeout_secs: config.storage.query_timeout_secs,
                ..Default::default()
            })
            .await?;
            storage.run_migrations().await?;
            info!("database migrations complete");

            serve(Arc::new(storage), addr, &config, metrics_state).await
        }
        other => anyhow::bail!("unknown storage backend: {other}"),
    }
}

/// Serves HTTP until Ctrl+C or SIGTERM, then drains in-flight requests.
async fn serve<S: ScanStore>(
    storage: Arc<S>,
    addr: SocketAddr,
    config: &ServerConfig,
    metrics_state: MetricsState,
) -> anyhow::Result<()> {
    let router = create_router_with_observability(AppState::new(storage), metrics_state, config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HTTP server shutdown complete");
    Ok(())
}

/// Resolves when Ctrl+C or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}

/// Directory that must exist before SQLite can create the database file.
///
/// `None` for in-memory databases and files in the working directory.
fn sqlite_parent_dir(url: &str) -> Option<PathBuf> {
    if url.contains(":memory:") || url.contains("mode=memory") {
        return None;
    }
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    let path = path.split('?').next().unwrap_or(path);

    Path::new(path)
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
}
