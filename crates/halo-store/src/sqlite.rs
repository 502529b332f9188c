//! SQLite pool configuration and migrations

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use halo_core::HaloError;

use crate::SqliteTx;

/// SQLite configuration options
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Database URL (e.g., "sqlite:halo.db?mode=rwc" or "sqlite::memory:")
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Enable WAL journal mode for better concurrency
    pub wal_mode: bool,
    /// Enable foreign key enforcement
    pub foreign_keys: bool,
    /// Busy timeout in seconds
    pub busy_timeout_secs: u32,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:halo.db?mode=rwc".to_string(),
            max_connections: 5,
            wal_mode: true,
            foreign_keys: true,
            busy_timeout_secs: 30,
        }
    }
}

impl SqliteConfig {
    /// Config for an in-memory database (testing)
    pub fn memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            wal_mode: false,
            foreign_keys: true,
            busy_timeout_secs: 5,
        }
    }
}

/// Shared connection pool; cheap to clone
#[derive(Debug, Clone)]
pub struct HaloDb {
    pool: SqlitePool,
}

impl HaloDb {
    /// Connect with full configuration and run migrations
    pub async fn connect(config: SqliteConfig) -> Result<Self, HaloError> {
        let mut options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| HaloError::Storage(e.to_string()))?;

        if config.foreign_keys {
            options = options.pragma("foreign_keys", "ON");
        }
        options = options.pragma("busy_timeout", config.busy_timeout_secs.to_string());
        if config.wal_mode {
            options = options.pragma("journal_mode", "WAL");
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| HaloError::Storage(e.to_string()))?;

        info!(url = %config.url, wal = config.wal_mode, "connected to SQLite");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| HaloError::Storage(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }

    /// In-memory database for tests
    pub async fn memory() -> Result<Self, HaloError> {
        Self::connect(SqliteConfig::memory()).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Begin a write transaction
    pub async fn begin(&self) -> Result<SqliteTx<'static>, HaloError> {
        self.pool.begin().await.map_err(crate::db_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_apply_on_memory_database() {
        let db = HaloDb::memory().await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM entities")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }

    #[tokio::test]
    async fn audit_table_rejects_update_and_delete() {
        let db = HaloDb::memory().await.unwrap();
        sqlx::query(
            "INSERT INTO audit_log (seq, previous_hash, entry_hash, event_type, actor_type, event_data, created_at) \
             VALUES (1, 'GENESIS', 'abc', 'ENTITY_CREATED', 'SYSTEM', '{}', '2026-01-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let update = sqlx::query("UPDATE audit_log SET event_data = '{\"x\":1}' WHERE seq = 1")
            .execute(db.pool())
            .await;
        assert!(update.is_err());

        let delete = sqlx::query("DELETE FROM audit_log WHERE seq = 1")
            .execute(db.pool())
            .await;
        assert!(delete.is_err());
    }
}
