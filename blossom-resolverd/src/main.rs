use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use blossom_resolverd::api;
use blossom_resolverd::config::Config;
use blossom_resolverd::directory::ServerDirectory;
use blossom_resolverd::directory_manager::{self, DirectoryHandle};
use blossom_resolverd::relay::StaticRelayClient;
use blossom_resolverd::resolver::ContentResolver;
use blossom_resolverd::transport::HttpTransport;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("blossom_resolverd=info"))
        )
        .init();

    tracing::info!("Starting blossom-resolverd");

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/blossom-resolverd/resolverd.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!(
        "Loaded config from {} ({} default servers)",
        config_path,
        config.directory.default_servers.len()
    );

    // Start directory task
    let directory = ServerDirectory::new(&config.directory)?;
    let directory_handle = DirectoryHandle::spawn(directory, Arc::new(StaticRelayClient));

    let transport = HttpTransport::new(&config.transport)?;
    let resolver = Arc::new(ContentResolver::new(
        config.resolver.clone(),
        directory_handle.clone(),
        Arc::new(transport),
    ));

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Spawn server-list sweeper
    let sweep_cancel = cancel.clone();
    let sweep_interval = config.directory.sweep_interval();
    let sweep_directory = directory_handle.clone();
    let sweep_handle = tokio::spawn(async move {
        if let Err(e) = directory_manager::run(sweep_directory, sweep_interval, sweep_cancel).await {
            tracing::error!("Directory sweeper error: {}", e);
        }
    });

    // Build API router
    let app_state = api::routes::AppState {
        directory: directory_handle.clone(),
        resolver,
    };
    let app = api::routes::router(app_state);

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.api.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.api.listen))?;

    tracing::info!("API listening on {}", config.api.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    cancel.cancel();

    let _ = tokio::join!(sweep_handle, server_handle);

    if let Err(e) = directory_handle.shutdown().await {
        tracing::error!("Failed to shutdown directory: {}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
