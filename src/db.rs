//! Metadata database
//!
//! Connection pool for the history store and the startup bootstrap of its
//! tables.

pub mod queries;

use crate::config::DatabaseConfig;
use crate::connection::make_tls_connector;
use crate::error::AppError;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::NoTls;
use tracing::{debug, info};

/// Create the metadata pool and verify it with a round trip
pub async fn create_pool(config: &DatabaseConfig) -> Result<Pool, AppError> {
    let mut cfg = Config::new();
    cfg.host = Some(config.host.clone());
    cfg.port = Some(config.port);
    cfg.user = Some(config.user.clone());
    cfg.password = Some(config.password.clone());
    cfg.dbname = Some(config.database.clone());
    cfg.manager = Some(ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    });
    cfg.pool = Some(PoolConfig::new(config.max_pool_size));

    let pool = if config.use_tls {
        cfg.create_pool(Some(Runtime::Tokio1), make_tls_connector())
            .map_err(|e| AppError::Config(format!("Failed to create TLS pool: {}", e)))?
    } else {
        cfg.create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| AppError::Config(format!("Failed to create pool: {}", e)))?
    };

    // Test connection
    let client = pool.get().await?;
    client.query_one("SELECT 1", &[]).await?;
    drop(client);

    info!(
        "Metadata pool ready: {}@{}:{}/{} (TLS: {}, max {} connections)",
        config.user, config.host, config.port, config.database, config.use_tls, config.max_pool_size
    );
    Ok(pool)
}

/// Create the metadata tables if they don't exist
pub async fn bootstrap(pool: &Pool) -> Result<(), AppError> {
    let client = pool.get().await?;
    for statement in queries::BOOTSTRAP {
        client.batch_execute(statement).await?;
    }
    debug!("Applied {} bootstrap statements", queries::BOOTSTRAP.len());
    info!("Metadata tables initialized");
    Ok(())
}
