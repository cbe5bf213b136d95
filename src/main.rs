//! bank-mesh - Funds Transfer Coordinator Service
//!
//! Composition root: every component is constructed here and receives its
//! collaborators as constructor parameters. Commands enter over HTTP or
//! the bus, workers drive them through the coordinator, and the
//! notification dispatcher consumes the resulting events.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bank_mesh::api::{self, AppState};
use bank_mesh::bus::{InMemoryBus, MessageBus};
use bank_mesh::coordinator::{TransferCoordinator, WorkerPool};
use bank_mesh::notify::{
    EmailProvider, HttpEmailProvider, LoggingEmailProvider, NotificationDispatcher,
    PgNotificationStore,
};
use bank_mesh::store::PgLedgerStore;
use bank_mesh::{db, Config};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bank_mesh=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing();

    // Load configuration
    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Starting bank-mesh coordinator");
    tracing::info!("Connecting to database...");

    // Create database pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    // Verify database schema
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    // Explicit construction, leaf to root: store, bus, coordinator,
    // workers, dispatcher. The in-process bus stands in for the durable
    // broker the deployment provides.
    let store = Arc::new(PgLedgerStore::new(pool.clone()));
    let notifications = Arc::new(PgNotificationStore::new(pool.clone()));
    let bus = Arc::new(InMemoryBus::new());

    let coordinator = Arc::new(TransferCoordinator::new(
        store.clone(),
        bus.clone(),
        config.retry_policy(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let workers = WorkerPool::spawn(
        config.worker_count,
        coordinator,
        bus.clone(),
        shutdown_rx.clone(),
    );

    let provider: Arc<dyn EmailProvider> = match &config.email_endpoint {
        Some(endpoint) => Arc::new(HttpEmailProvider::new(endpoint.clone())),
        None => Arc::new(LoggingEmailProvider),
    };

    let dispatcher = Arc::new(NotificationDispatcher::new(
        notifications.clone(),
        provider,
        config.notification_retry_cap,
        Duration::from_millis(config.backoff_base_ms),
    ));
    let dispatcher_handle = dispatcher.start(bus.subscribe_events(), shutdown_rx);

    // HTTP surface: health plus the /api/v1 ingress and ops routes
    let state = AppState {
        bus: bus.clone(),
        store,
        notifications,
    };
    let app = Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", api::create_router(state))
        .layer(TraceLayer::new_for_http());

    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop accepting, drain workers, then close the pool
    tracing::info!("Server shutting down...");
    let _ = shutdown_tx.send(true);
    bus.close();
    workers.join().await;
    if let Err(e) = dispatcher_handle.await {
        tracing::error!(error = %e, "Dispatcher task failed during shutdown");
    }

    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
