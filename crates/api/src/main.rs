//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use api::{AppState, create_app, demo_catalog};
use order_store::{InMemoryOrderStore, OrderStore, PostgresOrderStore};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn serve<S: OrderStore + Clone + 'static>(
    state: AppState<S>,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = create_app(Arc::new(state));

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env()?;
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Build the store and serve
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(config.db_max_connections)
                .connect(url)
                .await?;
            let store = PostgresOrderStore::new(pool).with_lock_timeout(config.lock_timeout);
            store.run_migrations().await?;
            tracing::info!("connected to PostgreSQL, migrations applied");

            serve(AppState::new(store, metrics_handle, "postgres"), &config).await
        }
        None => {
            let store = InMemoryOrderStore::with_products(demo_catalog())
                .with_lock_timeout(config.lock_timeout);
            tracing::warn!("DATABASE_URL not set, using the in-memory store with sample products");

            serve(AppState::new(store, metrics_handle, "memory"), &config).await
        }
    }
}
