//! Tradepost server entry point.
//!
//! Loads configuration, connects PostgreSQL, wires adapters into the
//! shared state, and serves the HTTP surface until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tradepost::adapters::gateway::HttpGatewayClient;
use tradepost::adapters::http::{app_router, AppState, GatewaySettings};
use tradepost::adapters::postgres::{
    PostgresAuditSink, PostgresLedgerStore, PostgresReservationStore,
};
use tradepost::config::AppConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.server.log_level.clone())),
        )
        .init();

    tracing::info!(
        environment = ?config.server.environment,
        "starting tradepost"
    );

    let pool = PgPoolOptions::new()
        .min_connections(config.database.min_connections)
        .max_connections(config.database.max_connections)
        .acquire_timeout(config.database.acquire_timeout())
        .connect(&config.database.url)
        .await?;

    if config.database.run_migrations {
        tracing::info!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;
    }

    let settings = Arc::new(GatewaySettings::from_config(&config)?);
    let gateway = HttpGatewayClient::new(
        config.gateway.validate_url.clone(),
        config.gateway.confirm_timeout(),
    )?;

    let state = AppState {
        ledger: Arc::new(PostgresLedgerStore::new(pool.clone())),
        gateway: Arc::new(gateway),
        audit: Arc::new(PostgresAuditSink::new(pool.clone())),
        reservations: Arc::new(PostgresReservationStore::new(pool)),
        settings,
    };

    let app = app_router()
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .with_state(state);

    let addr = config.server.socket_addr()?;
    tracing::info!(%addr, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("ctrl_c handler installation");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
