//! Box office HTTP server.
//!
//! ```bash
//! STORE_BACKEND=postgres DATABASE_URL=postgres://localhost/boxoffice cargo run --bin server
//! ```

use anyhow::Context;
use boxoffice_core::BoxOffice;
use boxoffice_postgres::{PostgresOrderStore, PostgresSeatStore};
use boxoffice_web::{AppState, Config, StoreBackend, build_router};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Invalid configuration")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,boxoffice=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(port) = config.server.metrics_port {
        let addr: SocketAddr = format!("{}:{port}", config.server.host)
            .parse()
            .context("Invalid metrics address")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(address = %addr, "Prometheus exporter listening");
    }

    let office = Arc::new(build_office(&config).await?);

    let restored = office.restore_catalog().await.context("Failed to restore sessions")?;
    info!(sessions = restored, "Seat catalog restored");

    let sweeper = config.sweep_interval().map(|period| {
        info!(period_secs = period.as_secs(), "Starting expiration sweeper");
        office.sweeper().spawn_ticker(period)
    });

    let app = build_router(AppState::new(Arc::clone(&office), &config.auth));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, backend = ?config.storage.backend, "Box office listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("Server stopped");
    Ok(())
}

async fn build_office(config: &Config) -> anyhow::Result<BoxOffice> {
    let builder = BoxOffice::builder().settings(config.settings());

    let builder = match config.storage.backend {
        StoreBackend::Memory => {
            info!("Using in-memory stores; state is lost on restart");
            builder
        }
        StoreBackend::Postgres => {
            let pool = boxoffice_postgres::connect(&config.storage.database_url, config.storage.max_connections)
                .await
                .context("Failed to connect to PostgreSQL")?;
            boxoffice_postgres::migrate(&pool)
                .await
                .context("Failed to run migrations")?;
            builder
                .seats(Arc::new(PostgresSeatStore::new(pool.clone())))
                .orders(Arc::new(PostgresOrderStore::new(pool)))
        }
    };

    Ok(builder.build())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
