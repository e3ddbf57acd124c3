//! PostgreSQL adapters for CMDB reconciliation.
//!
//! Implements the store-side traits of `cmdb-reconcile` over a shared
//! [`DbPool`]. CI documents live in a JSONB column; conditions compile to
//! containment filters so lookups use the GIN index.

pub mod audit;
pub mod error;
pub mod instances;
pub mod metadata;
pub mod migrations;
pub mod pool;
mod sql;
pub mod topology;

pub use audit::{PgAuditLogStore, PgSequenceGenerator};
pub use error::DbError;
pub use instances::PgCiStore;
pub use metadata::PgModelMetadata;
pub use migrations::run_migrations;
pub use pool::DbPool;
pub use topology::PgTopology;
