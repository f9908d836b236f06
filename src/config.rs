//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use crate::connection::ConnectionParams;
use crate::history::graph::DEFAULT_LOG_LIMIT;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// Signing secret used when `JWT_SECRET` is unset (development only)
pub const DEV_JWT_SECRET: &str = "dbgit-dev-secret-change-in-production";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // Bind to 0.0.0.0 for Railway/Docker
            port: 3000,
        }
    }
}

/// Metadata database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: usize,
    pub use_tls: bool,
}

/// CORS configuration
#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub jwt_secret: Option<String>,
}

/// Where and how rollbacks rebuild a target database
#[derive(Debug, Clone)]
pub struct RollbackConfig {
    pub schema: String,
    /// Bookkeeping table that survives a rollback
    pub reserved_table: String,
    /// Also reapply NOT NULL, DEFAULT and PRIMARY KEY
    pub full_fidelity: bool,
    pub statement_timeout_ms: Option<u64>,
}

impl Default for RollbackConfig {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            reserved_table: "_dbgit_meta".to_string(),
            full_fidelity: false,
            statement_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub format: LogFormat,
}

#[derive(Debug, Clone)]
pub struct HistoryConfig {
    pub default_log_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_log_limit: DEFAULT_LOG_LIMIT,
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    /// `None` runs the service on the in-memory history store
    pub database: Option<DatabaseConfig>,
    pub cors: CorsConfig,
    pub auth: AuthConfig,
    pub rollback: RollbackConfig,
    pub logging: LoggingConfig,
    pub history: HistoryConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore errors if file not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let server = ServerConfig {
            host: parse_or(var("HOST"), "HOST", ServerConfig::default().host)?,
            port: parse_or(var("PORT"), "PORT", ServerConfig::default().port)?,
        };

        let max_pool_size = parse_or(var("DB_MAX_CONNECTIONS"), "DB_MAX_CONNECTIONS", 10usize)?;
        let database = match var("DATABASE_URL") {
            Some(url) => Some(Self::parse_database_url(&url, max_pool_size)?),
            None => None,
        };

        let cors = CorsConfig {
            allowed_origins: var("ALLOWED_ORIGINS")
                .map(|s| s.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let auth = AuthConfig {
            jwt_secret: var("JWT_SECRET"),
        };

        let defaults = RollbackConfig::default();
        let rollback = RollbackConfig {
            schema: var("ROLLBACK_SCHEMA").unwrap_or(defaults.schema),
            reserved_table: var("ROLLBACK_RESERVED_TABLE").unwrap_or(defaults.reserved_table),
            full_fidelity: parse_bool(var("ROLLBACK_FULL_FIDELITY"), "ROLLBACK_FULL_FIDELITY")?,
            statement_timeout_ms: match var("ROLLBACK_STATEMENT_TIMEOUT_MS") {
                Some(raw) => Some(parse_value(&raw, "ROLLBACK_STATEMENT_TIMEOUT_MS")?),
                None => None,
            },
        };

        let logging = LoggingConfig {
            format: match var("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                Some("compact") | Some("pretty") | None => LogFormat::Compact,
                Some(other) => {
                    return Err(ConfigError::InvalidValue {
                        key: "LOG_FORMAT".to_string(),
                        message: format!("expected 'json' or 'compact', got '{}'", other),
                    })
                }
            },
        };

        let default_log_limit = parse_or(var("DEFAULT_LOG_LIMIT"), "DEFAULT_LOG_LIMIT", DEFAULT_LOG_LIMIT)?;
        if default_log_limit == 0 {
            return Err(ConfigError::InvalidValue {
                key: "DEFAULT_LOG_LIMIT".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            server,
            database,
            cors,
            auth,
            rollback,
            logging,
            history: HistoryConfig { default_log_limit },
        })
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    fn parse_database_url(url: &str, max_pool_size: usize) -> Result<DatabaseConfig, ConfigError> {
        let params = ConnectionParams::from_connection_string(url).map_err(|e| ConfigError::InvalidValue {
            key: "DATABASE_URL".to_string(),
            message: e.to_string(),
        })?;

        Ok(DatabaseConfig {
            host: params.host,
            port: params.port,
            user: params.user,
            password: params.password,
            database: params.database,
            max_pool_size,
            use_tls: params.use_tls,
        })
    }
}

fn parse_value<T: FromStr>(raw: &str, key: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{}': {}", raw, e),
    })
}

fn parse_or<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse_value(&raw, key),
        None => Ok(default),
    }
}

fn parse_bool(raw: Option<String>, key: &str) -> Result<bool, ConfigError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{}' is not a boolean", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio_test::{assert_err, assert_ok};

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = assert_ok!(settings(&[]));
        assert_eq!(settings.server.host, Ipv4Addr::new(0, 0, 0, 0));
        assert_eq!(settings.server.port, 3000);
        assert!(settings.database.is_none());
        assert_eq!(settings.rollback.schema, "public");
        assert_eq!(settings.rollback.reserved_table, "_dbgit_meta");
        assert!(!settings.rollback.full_fidelity);
        assert_eq!(settings.history.default_log_limit, 20);
        assert_eq!(settings.logging.format, LogFormat::Compact);
    }

    #[test]
    fn test_database_url_is_parsed() {
        let settings = settings(&[
            ("DATABASE_URL", "postgresql://app:pw@db.internal:6543/history?sslmode=require"),
            ("DB_MAX_CONNECTIONS", "4"),
        ])
        .unwrap();
        let db = settings.database.unwrap();
        assert_eq!(db.host, "db.internal");
        assert_eq!(db.port, 6543);
        assert_eq!(db.database, "history");
        assert_eq!(db.max_pool_size, 4);
        assert!(db.use_tls);
    }

    #[test]
    fn test_database_url_credentials_are_decoded() {
        let settings = assert_ok!(settings(&[("DATABASE_URL", "postgres://app:s%3Acret%23@db/history")]));
        assert_eq!(settings.database.unwrap().password, "s:cret#");
    }

    #[test]
    fn test_rollback_options() {
        let settings = settings(&[
            ("ROLLBACK_FULL_FIDELITY", "true"),
            ("ROLLBACK_STATEMENT_TIMEOUT_MS", "5000"),
            ("ROLLBACK_SCHEMA", "app"),
        ])
        .unwrap();
        assert!(settings.rollback.full_fidelity);
        assert_eq!(settings.rollback.statement_timeout_ms, Some(5000));
        assert_eq!(settings.rollback.schema, "app");
    }

    #[test]
    fn test_invalid_values_are_reported_with_their_key() {
        let err = assert_err!(settings(&[("PORT", "eighty")]));
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "PORT"));

        let err = settings(&[("ROLLBACK_FULL_FIDELITY", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("ROLLBACK_FULL_FIDELITY"));

        assert_err!(settings(&[("DEFAULT_LOG_LIMIT", "0")]));
        assert_err!(settings(&[("DATABASE_URL", "mysql://x@y/z")]));
    }
}
