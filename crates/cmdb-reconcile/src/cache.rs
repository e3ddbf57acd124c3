//! Cache Gateway
//!
//! Advisory cache in front of the CI store. The gateway is the only writer
//! and deleter of instance entries, and never fails a reconciliation: every
//! backend or decoding error degrades to a miss or a no-op.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use thiserror::Error;
use tracing::{debug, warn};

use cmdb_core::CiDocument;

/// Default lifetime of a cached instance.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default capacity of the in-process cache.
pub const DEFAULT_CACHE_CAPACITY: u64 = 10_000;

/// Errors raised by cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache payload error: {0}")]
    Payload(#[from] serde_json::Error),
}

/// A key/value cache holding serialized documents.
#[async_trait]
pub trait AdvisoryCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

#[derive(Debug, Clone)]
struct CachedValue {
    payload: Arc<str>,
    ttl: Duration,
}

/// Expires each entry after its own TTL.
struct PerEntryTtl;

impl Expiry<String, CachedValue> for PerEntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedValue,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CachedValue,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache backend built on `moka`.
pub struct MokaCache {
    cache: Cache<String, CachedValue>,
}

impl MokaCache {
    /// Create a bounded cache.
    #[must_use]
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryTtl)
            .build();
        Self { cache }
    }

    /// Number of live entries (approximate until pending tasks run).
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Drop every entry.
    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[async_trait]
impl AdvisoryCache for MokaCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self
            .cache
            .get(key)
            .await
            .map(|value| value.payload.to_string()))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.cache
            .insert(
                key.to_string(),
                CachedValue {
                    payload: Arc::from(value),
                    ttl,
                },
            )
            .await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }
}

/// Best-effort front for previously resolved CI documents.
#[derive(Clone)]
pub struct CacheGateway {
    backend: Option<Arc<dyn AdvisoryCache>>,
    ttl: Duration,
}

impl CacheGateway {
    /// Create a gateway over a backend.
    #[must_use]
    pub fn new(backend: Arc<dyn AdvisoryCache>, ttl: Duration) -> Self {
        Self {
            backend: Some(backend),
            ttl,
        }
    }

    /// Create a gateway over a fresh in-process cache.
    #[must_use]
    pub fn in_memory(max_capacity: u64, ttl: Duration) -> Self {
        Self::new(Arc::new(MokaCache::new(max_capacity)), ttl)
    }

    /// A gateway that always misses.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            backend: None,
            ttl: DEFAULT_CACHE_TTL,
        }
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    /// TTL applied by [`CacheGateway::set`].
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Look up a document. Backend and decoding failures count as a miss.
    pub async fn get(&self, key: &str) -> Option<CiDocument> {
        let backend = self.backend.as_ref()?;

        let raw = match backend.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                debug!(cache_key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<CiDocument>(&raw) {
            Ok(document) => {
                debug!(cache_key = %key, "Cache hit");
                Some(document)
            }
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Cached entry is not a document, treating as miss");
                None
            }
        }
    }

    /// Store a document with the gateway TTL.
    pub async fn set(&self, key: &str, document: &CiDocument) {
        self.set_with_ttl(key, document, self.ttl).await;
    }

    /// Store a document with an explicit TTL. Failures are logged and ignored.
    pub async fn set_with_ttl(&self, key: &str, document: &CiDocument, ttl: Duration) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };

        let payload = match serde_json::to_string(document) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(cache_key = %key, error = %e, "Failed to encode document for cache");
                return;
            }
        };

        if let Err(e) = backend.set(key, payload, ttl).await {
            warn!(cache_key = %key, error = %e, "Cache write failed");
        }
    }

    /// Remove an entry. Failures are logged and ignored.
    pub async fn invalidate(&self, key: &str) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };

        if let Err(e) = backend.delete(key).await {
            warn!(cache_key = %key, error = %e, "Cache invalidation failed");
        }
    }
}

impl std::fmt::Debug for CacheGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheGateway")
            .field("enabled", &self.is_enabled())
            .field("ttl", &self.ttl)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct BrokenCache;

    #[async_trait]
    impl AdvisoryCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }
    }

    fn doc() -> CiDocument {
        CiDocument::from_value(json!({"bk_inst_id": 1, "bk_inst_name": "sw-01"})).unwrap()
    }

    #[tokio::test]
    async fn test_set_get_invalidate() {
        let gateway = CacheGateway::in_memory(100, DEFAULT_CACHE_TTL);
        assert!(gateway.get("k").await.is_none());

        gateway.set("k", &doc()).await;
        assert_eq!(gateway.get("k").await, Some(doc()));

        gateway.invalidate("k").await;
        assert!(gateway.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let gateway = CacheGateway::in_memory(100, DEFAULT_CACHE_TTL);
        gateway
            .set_with_ttl("short", &doc(), Duration::from_millis(50))
            .await;
        gateway.set("long", &doc()).await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(gateway.get("short").await.is_none());
        assert!(gateway.get("long").await.is_some());
    }

    #[tokio::test]
    async fn test_garbage_entry_is_a_miss() {
        let backend = Arc::new(MokaCache::default());
        backend
            .set("k", "not json".to_string(), DEFAULT_CACHE_TTL)
            .await
            .unwrap();

        let gateway = CacheGateway::new(backend, DEFAULT_CACHE_TTL);
        assert!(gateway.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_broken_backend_degrades_silently() {
        let gateway = CacheGateway::new(Arc::new(BrokenCache), DEFAULT_CACHE_TTL);
        gateway.set("k", &doc()).await;
        assert!(gateway.get("k").await.is_none());
        gateway.invalidate("k").await;
    }

    #[tokio::test]
    async fn test_disabled_gateway_always_misses() {
        let gateway = CacheGateway::disabled();
        assert!(!gateway.is_enabled());
        gateway.set("k", &doc()).await;
        assert!(gateway.get("k").await.is_none());
    }
}
