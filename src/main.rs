//! DB-Git server - version control for relational database schemas
//!
//! Stores point-in-time schema snapshots as commits on named branches,
//! diffs them structurally, and rebuilds a project's target database from
//! any stored commit inside a single transaction.

mod auth;
mod config;
mod connection;
mod db;
mod error;
mod history;
mod models;
mod rollback;
mod routes;
mod snapshot;
mod state;

use crate::config::{LogFormat, Settings, DEV_JWT_SECRET};
use crate::history::{HistoryStore, MemoryHistoryStore, PostgresHistoryStore};
use crate::routes::create_router;
use crate::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = Settings::load()?;

    // Initialize tracing subscriber for structured logging
    init_tracing(settings.logging.format);

    info!("Starting DB-Git server v{}", env!("CARGO_PKG_VERSION"));

    let jwt_secret = match settings.auth.jwt_secret.clone() {
        Some(secret) => secret,
        None => {
            warn!("JWT_SECRET not set, using default (INSECURE - set in production!)");
            let token = auth::create_token("dev", Some("dev"), DEV_JWT_SECRET, chrono::Duration::hours(12))?;
            info!("Development token (12h): {}", token);
            DEV_JWT_SECRET.to_string()
        }
    };

    let store: Arc<dyn HistoryStore> = match &settings.database {
        Some(database) => {
            let pool = db::create_pool(database).await?;
            db::bootstrap(&pool).await?;
            Arc::new(PostgresHistoryStore::new(pool))
        }
        None => {
            warn!("DATABASE_URL not set, history is kept in memory and lost on shutdown");
            Arc::new(MemoryHistoryStore::new())
        }
    };

    let state = Arc::new(AppState::new(store, &settings, jwt_secret));
    let app = create_router(state, &settings);

    let addr = SocketAddr::from((settings.server.host, settings.server.port));
    info!("Server listening on http://{}", addr);
    info!(
        "Rollbacks target schema '{}' (reserved table: {}, full fidelity: {})",
        settings.rollback.schema, settings.rollback.reserved_table, settings.rollback.full_fidelity
    );

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing with structured logging
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dbgit_server=debug,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_current_span(true)).init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init(),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal, initiating graceful shutdown...");
        },
        _ = terminate => {
            info!("Received terminate signal, initiating graceful shutdown...");
        },
    }
}
