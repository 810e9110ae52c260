//! Database layer for HireLens
//!
//! Provides:
//! - SeaORM entity models
//! - Connection pool management

pub mod models;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let url = with_statement_timeout(&config.url, config.statement_timeout_secs);
        let mut opts = ConnectOptions::new(url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(300))
            .sqlx_logging(false);

        let conn = Database::connect(opts)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect: {}", e),
            })?;

        info!("Database connection established");

        Ok(Self { conn })
    }

    /// Wrap an existing connection (used by tests)
    pub fn from_connection(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Get the underlying connection
    pub fn conn(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        use sea_orm::ConnectionTrait;

        self.conn
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Ping failed: {}", e),
            })?;

        Ok(())
    }
}

/// Append a server-side `statement_timeout` to the connection URL so
/// every job-store operation has a bounded budget. URLs that already
/// carry query parameters are left untouched.
fn with_statement_timeout(url: &str, secs: u64) -> String {
    if url.contains('?') {
        url.to_string()
    } else {
        format!("{}?options=-c%20statement_timeout%3D{}s", url, secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_timeout_appended() {
        let url = with_statement_timeout("postgres://localhost/hirelens", 5);
        assert_eq!(
            url,
            "postgres://localhost/hirelens?options=-c%20statement_timeout%3D5s"
        );
    }

    #[test]
    fn test_urls_with_params_untouched() {
        let url = with_statement_timeout("postgres://localhost/hirelens?sslmode=require", 5);
        assert_eq!(url, "postgres://localhost/hirelens?sslmode=require");
    }
}
