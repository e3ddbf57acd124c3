//! CI Store Adapter
//!
//! Contract for the document store holding CI records. Concrete adapters
//! (Postgres, in-memory) live outside the reconciliation logic.

use async_trait::async_trait;
use thiserror::Error;

use cmdb_core::{CiDocument, Condition, CoreError, InstanceId, ObjectType};

/// Errors reported by store-backed collaborators.
///
/// Used by the CI store, model metadata, audit log, sequence generator and
/// topology lookups alike.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed the request.
    #[error("Store backend error: {message}")]
    Backend {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A stored or outgoing value could not be (de)serialized.
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored value is not a valid CI document.
    #[error("Store returned an invalid document: {0}")]
    InvalidDocument(#[from] CoreError),
}

impl StoreError {
    /// Create a backend error without an underlying cause.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
            source: None,
        }
    }

    /// Create a backend error wrapping the underlying cause.
    pub fn backend_with_source<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Read/create/update contract over CI documents.
///
/// Conditions are conjunctions of equality and membership predicates.
#[async_trait]
pub trait CiStore: Send + Sync {
    /// Read the single document matching the condition, if any.
    async fn read_one(
        &self,
        object_type: &ObjectType,
        condition: &Condition,
    ) -> StoreResult<Option<CiDocument>>;

    /// Persist a new document and return its assigned instance id.
    async fn create(&self, object_type: &ObjectType, document: &CiDocument)
        -> StoreResult<InstanceId>;

    /// Overwrite the given fields on every document matching the condition.
    ///
    /// Returns the number of matched documents.
    async fn update_by_condition(
        &self,
        object_type: &ObjectType,
        condition: &Condition,
        changes: &CiDocument,
    ) -> StoreResult<u64>;
}
