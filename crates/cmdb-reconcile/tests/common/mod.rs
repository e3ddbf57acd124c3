//! Shared fixtures and hand-written mocks for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use cmdb_core::{CiDocument, Condition, InstanceId, ObjectType, TenantId};
use cmdb_reconcile::audit::{AuditLogEntry, AuditLogStore, SequenceGenerator};
use cmdb_reconcile::cache::{AdvisoryCache, CacheError, CacheGateway};
use cmdb_reconcile::memory::{
    MemoryAuditLog, MemoryCiStore, MemoryModelMetadata, MemorySequenceGenerator,
};
use cmdb_reconcile::store::{CiStore, StoreError, StoreResult};
use cmdb_reconcile::{
    AttributeMeta, AttributeType, AuditRecorder, Reconciler, ReconcilerConfig, ReconcilerDeps,
    RequestContext, UniqueRule,
};

// =============================================================================
// Manual Mock Implementations
// =============================================================================

/// CI store wrapper counting calls, with switchable failures.
pub struct CountingStore {
    inner: MemoryCiStore,
    pub read_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl CountingStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: MemoryCiStore::new(),
            read_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            update_calls: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn fail_reads(&self) {
        self.fail_reads.store(true, Ordering::SeqCst);
    }

    pub fn fail_writes(&self) {
        self.fail_writes.store(true, Ordering::SeqCst);
    }

    pub fn reads(&self) -> usize {
        self.read_calls.load(Ordering::SeqCst)
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub async fn documents(&self, object_type: &str) -> Vec<CiDocument> {
        self.inner.documents(&ObjectType::from(object_type)).await
    }

    pub async fn get(&self, object_type: &str, id: InstanceId) -> Option<CiDocument> {
        self.inner.get(&ObjectType::from(object_type), id).await
    }

    /// Delete a document behind the reconciler's back.
    pub async fn remove(&self, object_type: &str, id: InstanceId) -> bool {
        self.inner.remove(&ObjectType::from(object_type), id).await
    }
}

#[async_trait]
impl CiStore for CountingStore {
    async fn read_one(
        &self,
        object_type: &ObjectType,
        condition: &Condition,
    ) -> StoreResult<Option<CiDocument>> {
        self.read_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::backend("read timed out"));
        }
        self.inner.read_one(object_type, condition).await
    }

    async fn create(
        &self,
        object_type: &ObjectType,
        document: &CiDocument,
    ) -> StoreResult<InstanceId> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("write rejected"));
        }
        self.inner.create(object_type, document).await
    }

    async fn update_by_condition(
        &self,
        object_type: &ObjectType,
        condition: &Condition,
        changes: &CiDocument,
    ) -> StoreResult<u64> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::backend("write rejected"));
        }
        self.inner
            .update_by_condition(object_type, condition, changes)
            .await
    }
}

/// Cache backend that fails every call.
#[derive(Default)]
pub struct FailingCache {
    pub calls: AtomicUsize,
}

#[async_trait]
impl AdvisoryCache for FailingCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Backend("connection refused".into()))
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Backend("connection refused".into()))
    }
}

/// Audit log that can be switched to fail appends.
#[derive(Default)]
pub struct SwitchableAuditLog {
    inner: MemoryAuditLog,
    fail: AtomicBool,
    rejected: Mutex<Vec<i64>>,
    pub append_calls: AtomicUsize,
}

impl SwitchableAuditLog {
    pub fn fail_appends(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    pub fn restore_appends(&self) {
        self.fail.store(false, Ordering::SeqCst);
    }

    /// Ids of entries whose append was rejected.
    pub async fn rejected_ids(&self) -> Vec<i64> {
        self.rejected.lock().await.clone()
    }

    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.inner.entries().await
    }
}

#[async_trait]
impl AuditLogStore for SwitchableAuditLog {
    async fn append(&self, entries: &[AuditLogEntry]) -> StoreResult<()> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            self.rejected
                .lock()
                .await
                .extend(entries.iter().map(|e| e.id));
            return Err(StoreError::backend("audit table locked"));
        }
        self.inner.append(entries).await
    }
}

/// Sequence generator that always fails.
#[derive(Default)]
pub struct FailingSequence;

#[async_trait]
impl SequenceGenerator for FailingSequence {
    async fn next_ids(
        &self,
        _tenant: &TenantId,
        _name: &str,
        _count: usize,
    ) -> StoreResult<Vec<i64>> {
        Err(StoreError::backend("sequence unavailable"))
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Attribute ids used by the fixtures.
pub const SWITCH_NAME_ATTR: i64 = 1;
pub const HOST_IP_ATTR: i64 = 10;
pub const HOST_CLOUD_ATTR: i64 = 11;

/// Metadata with:
/// - `bk_switch` identified by `bk_inst_name`
/// - `host` identified by (`bk_host_innerip`, `bk_cloud_id`)
/// - `bk_router` with no must-check rule
pub async fn metadata() -> Arc<MemoryModelMetadata> {
    let metadata = Arc::new(MemoryModelMetadata::new());

    for attr in [
        AttributeMeta::new(SWITCH_NAME_ATTR, "bk_switch", "bk_inst_name", "Name", AttributeType::SingleChar),
        AttributeMeta::new(2, "bk_switch", "vendor", "Vendor", AttributeType::SingleChar),
        AttributeMeta::new(3, "bk_switch", "port_count", "Ports", AttributeType::Int),
        AttributeMeta::new(4, "bk_switch", "host", "Host", AttributeType::Other("foreignkey".into())),
        AttributeMeta::new(HOST_IP_ATTR, "host", "bk_host_innerip", "Inner IP", AttributeType::SingleChar),
        AttributeMeta::new(HOST_CLOUD_ATTR, "host", "bk_cloud_id", "Cloud", AttributeType::Int),
        AttributeMeta::new(12, "host", "bk_os_name", "OS", AttributeType::SingleChar),
        AttributeMeta::new(20, "bk_router", "bk_inst_name", "Name", AttributeType::SingleChar),
    ] {
        metadata.add_attribute(attr).await;
    }

    metadata
        .add_rule(UniqueRule {
            id: 1,
            object_type: ObjectType::from("bk_switch"),
            keys: vec![SWITCH_NAME_ATTR],
            must_check: true,
        })
        .await;
    metadata
        .add_rule(UniqueRule {
            id: 2,
            object_type: ObjectType::from("host"),
            keys: vec![HOST_IP_ATTR, HOST_CLOUD_ATTR],
            must_check: true,
        })
        .await;

    metadata
}

/// Collaborators of one reconciler under test.
pub struct Harness {
    pub store: Arc<CountingStore>,
    pub audit_log: Arc<SwitchableAuditLog>,
    pub reconciler: Reconciler,
}

impl Harness {
    /// Reconciler over an in-process cache.
    pub async fn new() -> Self {
        Self::build(ReconcilerConfig::default().cache_gateway(), ReconcilerConfig::default()).await
    }

    /// Reconciler over the given cache gateway.
    pub async fn with_cache(cache: CacheGateway) -> Self {
        Self::build(cache, ReconcilerConfig::default()).await
    }

    /// Reconciler with a custom configuration.
    pub async fn with_config(config: ReconcilerConfig) -> Self {
        Self::build(config.cache_gateway(), config).await
    }

    async fn build(cache: CacheGateway, config: ReconcilerConfig) -> Self {
        let store = Arc::new(CountingStore::new());
        let audit_log = Arc::new(SwitchableAuditLog::default());
        let reconciler = Reconciler::new(
            ReconcilerDeps {
                store: store.clone(),
                metadata: metadata().await,
                cache,
                audit: AuditRecorder::new(
                    Arc::new(MemorySequenceGenerator::new()),
                    audit_log.clone(),
                ),
            },
            &config,
        );
        Self {
            store,
            audit_log,
            reconciler,
        }
    }
}

/// Collector context for tenant "0".
pub fn ctx() -> RequestContext {
    RequestContext::collector(TenantId::from("0"))
}

/// Wrap attributes into a collector message.
pub fn message(object_type: &str, data: Value) -> String {
    json!({
        "data": {
            "meta": {"model": {"bk_obj_id": object_type, "bk_supplier_account": "0"}},
            "data": data.to_string()
        }
    })
    .to_string()
}

pub fn switch_message(data: Value) -> String {
    message("bk_switch", data)
}
