use std::sync::Arc;

use ride_dispatch::api;
use ride_dispatch::config::{Config, LogFormat};
use ride_dispatch::engine::sweeper::spawn_sweepers;
use ride_dispatch::error::AppError;
use ride_dispatch::state::AppState;
use ride_dispatch::store::RideStore;
use ride_dispatch::store::memory::MemoryStore;
use ride_dispatch::store::postgres::PgStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let store = open_store(&config).await?;
    let shared_state = Arc::new(AppState::new(
        store,
        config.ride.clone(),
        config.event_buffer_size,
    ));

    let sweepers = spawn_sweepers(shared_state.clone());
    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    sweepers.shutdown().await;
    tracing::info!("shutdown complete");

    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn RideStore>, AppError> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            tracing::info!("using postgres ride store");
            Ok(Arc::new(store))
        }
        None => {
            let store = MemoryStore::new();
            if config.seed_demo_data {
                store.seed_demo_data(chrono::Utc::now());
            }
            tracing::warn!("DATABASE_URL not set, using in-memory ride store");
            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
