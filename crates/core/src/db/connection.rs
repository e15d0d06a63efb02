//! Database connection management

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{error, info};

use crate::config::RelayConfig;
use crate::error::{CoreError, Result};

/// Database connection pool
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn new(config: &RelayConfig) -> Result<Self> {
        info!("Connecting to database");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                error!("Failed to connect to database: {}", e);
                CoreError::DatabaseConnection(e.to_string())
            })?;

        info!("Database connection established");
        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        let migration_0001 = include_str!("../../migrations/0001_init.sql");
        let migration_0002 = include_str!("../../migrations/0002_performance_indexes.sql");

        info!("Running migration 0001_init.sql");
        sqlx::raw_sql(migration_0001)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Migration 0001 failed: {}", e);
                CoreError::DatabaseMigration(format!("Failed to run 0001_init.sql: {}", e))
            })?;

        info!("Running migration 0002_performance_indexes.sql");
        sqlx::raw_sql(migration_0002)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Migration 0002 failed: {}", e);
                CoreError::DatabaseMigration(format!(
                    "Failed to run 0002_performance_indexes.sql: {}",
                    e
                ))
            })?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Check database health
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("select 1")
            .execute(&self.pool)
            .await
            .map_err(CoreError::DatabaseQuery)?;
        Ok(())
    }
}
