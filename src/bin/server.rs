//! Shoplist Server
//!
//! Serves the shopping list, its history and item images to Shoplist
//! clients. See `shoplist::config` for the environment variables and key
//! file format, and `shoplist::server` for the endpoints.

use shoplist::config::{ConfigFile, ServerConfig};
use shoplist::db::{init_db, SqliteStore};
use shoplist::server::{router, ApiKeyStore, AppState, FsBlobStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shoplist_server=info,shoplist=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = ServerConfig::from_env();

    tracing::info!("Database: {}", config.database_path.display());
    tracing::info!("Blob directory: {}", config.blob_dir.display());
    tracing::info!("Config file: {}", config.config_path.display());

    std::fs::create_dir_all(&config.blob_dir)?;
    let pool = init_db(&config.database_path).await?;

    // Load API keys
    let api_keys = ApiKeyStore::from_entries(ConfigFile::load(&config.config_path)?.api_keys);
    if api_keys.is_open() {
        tracing::warn!("No API keys loaded - the server is open to anyone who can reach it");
    } else {
        tracing::info!("Loaded {} API key(s)", api_keys.len());
    }

    // Build app state
    let state = AppState {
        store: Arc::new(SqliteStore::new(pool)),
        blobs: Arc::new(FsBlobStore::new(&config.blob_dir, &config.public_url)),
        api_keys: Arc::new(api_keys),
    };

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
