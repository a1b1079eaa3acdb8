//! Tenantry Service - multi-tenant admin and storefront API
//!
//! This is the main entry point for the tenantry service.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tenantry_service::config::StoreBackend;
use tenantry_service::idempotency::Retention;
use tenantry_service::{create_shared_router, seed_demo, AppState, ServiceConfig};
use tenantry_store::{MemoryStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tenantry=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Tenantry Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();

    tracing::info!(
        listen_addr = %config.listen_addr,
        environment = %config.environment,
        store_backend = ?config.store_backend,
        seed_demo = config.seed_demo,
        "Service configuration loaded"
    );

    let store = open_store(&config)?;
    let state = Arc::new(AppState::new(store, config.clone()));

    if config.seed_demo {
        seed_demo(&state)?;
    }

    spawn_sweeper(Arc::clone(&state));

    let app = create_shared_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT, shutting down"),
        () = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>, Box<dyn std::error::Error>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store - data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "rocksdb-backend")]
        StoreBackend::RocksDb => {
            tracing::info!(path = %config.data_dir, "Opening RocksDB store");
            Ok(Arc::new(tenantry_store::RocksStore::open(&config.data_dir)?))
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        StoreBackend::RocksDb => {
            tracing::error!("STORE_BACKEND=rocksdb needs the rocksdb-backend feature");
            Err("rocksdb backend not compiled in".into())
        }
    }
}

/// Periodically drop expired idempotency records and idle rate buckets.
fn spawn_sweeper(state: Arc<AppState>) {
    let every = Duration::from_secs(state.config.idempotency_sweep_interval_seconds.max(1));
    let retention = Retention {
        completed: chrono::Duration::hours(i64::try_from(state.config.idempotency_ttl_hours).unwrap_or(24)),
        pending: chrono::Duration::seconds(
            i64::try_from(state.config.idempotency_pending_ttl_seconds).unwrap_or(300),
        ),
    };

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if let Err(e) = state.idempotency.sweep(chrono::Utc::now(), retention) {
                tracing::error!(error = %e, "Idempotency sweep failed");
            }
            let purged = state.rate_limiter.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Purged idle rate limit buckets");
            }
        }
    });
}
