//! Connection pool.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DbError;

/// Default maximum pool size.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Postgres connection pool shared by every adapter.
#[derive(Debug, Clone)]
pub struct DbPool {
    pool: PgPool,
}

impl DbPool {
    /// Connect with the default pool size.
    ///
    /// # Errors
    ///
    /// Returns `DbError::ConnectionFailed` if the database is unreachable.
    pub async fn connect(database_url: &str) -> Result<Self, DbError> {
        Self::connect_with(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    /// Connect with an explicit pool size.
    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self, DbError> {
        tracing::info!(max_connections, "Connecting to database");
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(DbError::ConnectionFailed)?;
        Ok(Self { pool })
    }

    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn inner(&self) -> &PgPool {
        &self.pool
    }
}
