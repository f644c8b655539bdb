use anyhow::{Context, Result};
use landmark_sync::{
    config::Config,
    db::PgStore,
    detector::ChangeDetector,
    metrics::SyncMetrics,
    provider::{DifyProvider, TranslationProvider},
    resolver::TranslationResolver,
    server::{self, AppState},
    store::VersionStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (ignored in production)
    let _ = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("landmark_sync=info".parse()?),
        )
        .init();

    info!("Starting landmark sync server");

    let config = Config::from_env()?;

    let db = PgStore::connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    let store: Arc<dyn VersionStore> = Arc::new(db);

    let provider: Arc<dyn TranslationProvider> = Arc::new(DifyProvider::new(&config)?);
    let metrics = Arc::new(SyncMetrics::new());

    let state = AppState {
        detector: Arc::new(ChangeDetector::new(Arc::clone(&store), Arc::clone(&metrics))),
        resolver: Arc::new(TranslationResolver::new(
            Arc::clone(&store),
            provider,
            Arc::clone(&metrics),
        )),
        store,
        metrics,
    };

    if config.api_key.is_none() {
        info!("API_KEY not set, translation endpoints are unauthenticated");
    }
    let app = server::router(state, config.api_key.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
