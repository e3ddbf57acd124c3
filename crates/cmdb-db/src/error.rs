//! Error types for the cmdb-db crate.

use thiserror::Error;

use cmdb_reconcile::StoreError;

/// Database setup errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Failed to establish or acquire a database connection.
    #[error("Database connection failed: {0}")]
    ConnectionFailed(#[source] sqlx::Error),

    /// A database migration failed to apply.
    #[error("Migration failed: {0}")]
    MigrationFailed(#[source] sqlx::migrate::MigrateError),
}

impl DbError {
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(self, DbError::ConnectionFailed(_))
    }

    #[must_use]
    pub fn is_migration_error(&self) -> bool {
        matches!(self, DbError::MigrationFailed(_))
    }
}

/// Wrap a query failure as a store error carrying the operation name.
pub(crate) fn query_failed(operation: &str, err: sqlx::Error) -> StoreError {
    StoreError::backend_with_source(format!("{operation} failed"), err)
}
