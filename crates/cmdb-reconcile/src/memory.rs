//! In-Memory Collaborators
//!
//! Process-local implementations of every store-side trait. Used by tests and
//! by embedders that do not need persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use cmdb_core::{fields, BizId, CiDocument, Condition, InstanceId, ObjectType, TenantId};

use crate::audit::{AuditLogEntry, AuditLogStore, SequenceGenerator};
use crate::metadata::{AttributeMeta, ModelMetadata, UniqueRule};
use crate::store::{CiStore, StoreResult};
use crate::topology::{HostModuleRelation, HostRelationSource, TopologyNameSource, TopologyNames};

/// CI store keeping documents per object type.
#[derive(Debug)]
pub struct MemoryCiStore {
    documents: RwLock<HashMap<ObjectType, Vec<CiDocument>>>,
    next_id: AtomicI64,
}

impl Default for MemoryCiStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCiStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    /// Snapshot of every stored document of a type.
    pub async fn documents(&self, object_type: &ObjectType) -> Vec<CiDocument> {
        self.documents
            .read()
            .await
            .get(object_type)
            .cloned()
            .unwrap_or_default()
    }

    /// Fetch one document by instance id.
    pub async fn get(&self, object_type: &ObjectType, id: InstanceId) -> Option<CiDocument> {
        self.documents
            .read()
            .await
            .get(object_type)?
            .iter()
            .find(|doc| doc.instance_id() == Some(id))
            .cloned()
    }

    /// Delete one document by instance id. Returns whether it existed.
    pub async fn remove(&self, object_type: &ObjectType, id: InstanceId) -> bool {
        let mut guard = self.documents.write().await;
        let Some(docs) = guard.get_mut(object_type) else {
            return false;
        };
        let before = docs.len();
        docs.retain(|doc| doc.instance_id() != Some(id));
        docs.len() != before
    }
}

#[async_trait]
impl CiStore for MemoryCiStore {
    async fn read_one(
        &self,
        object_type: &ObjectType,
        condition: &Condition,
    ) -> StoreResult<Option<CiDocument>> {
        let guard = self.documents.read().await;
        Ok(guard
            .get(object_type)
            .and_then(|docs| docs.iter().find(|doc| condition.matches(doc)))
            .cloned())
    }

    async fn create(
        &self,
        object_type: &ObjectType,
        document: &CiDocument,
    ) -> StoreResult<InstanceId> {
        let id = InstanceId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut stored = document.clone();
        stored.insert(fields::INSTANCE_ID, Value::from(id.get()));

        self.documents
            .write()
            .await
            .entry(object_type.clone())
            .or_default()
            .push(stored);
        Ok(id)
    }

    async fn update_by_condition(
        &self,
        object_type: &ObjectType,
        condition: &Condition,
        changes: &CiDocument,
    ) -> StoreResult<u64> {
        let mut guard = self.documents.write().await;
        let mut matched = 0;
        if let Some(docs) = guard.get_mut(object_type) {
            for doc in docs.iter_mut().filter(|doc| condition.matches(doc)) {
                doc.merge(changes);
                matched += 1;
            }
        }
        Ok(matched)
    }
}

/// Model metadata configured up front.
#[derive(Debug, Default)]
pub struct MemoryModelMetadata {
    rules: RwLock<HashMap<ObjectType, Vec<UniqueRule>>>,
    attributes: RwLock<HashMap<ObjectType, Vec<AttributeMeta>>>,
}

impl MemoryModelMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a uniqueness rule.
    pub async fn add_rule(&self, rule: UniqueRule) {
        self.rules
            .write()
            .await
            .entry(rule.object_type.clone())
            .or_default()
            .push(rule);
    }

    /// Register an attribute declaration.
    pub async fn add_attribute(&self, attribute: AttributeMeta) {
        self.attributes
            .write()
            .await
            .entry(attribute.object_type.clone())
            .or_default()
            .push(attribute);
    }
}

#[async_trait]
impl ModelMetadata for MemoryModelMetadata {
    async fn must_check_rules(
        &self,
        object_type: &ObjectType,
        _tenant: &TenantId,
    ) -> StoreResult<Vec<UniqueRule>> {
        Ok(self
            .rules
            .read()
            .await
            .get(object_type)
            .map(|rules| rules.iter().filter(|r| r.must_check).cloned().collect())
            .unwrap_or_default())
    }

    async fn attributes(
        &self,
        object_type: &ObjectType,
        _tenant: &TenantId,
    ) -> StoreResult<Vec<AttributeMeta>> {
        Ok(self
            .attributes
            .read()
            .await
            .get(object_type)
            .cloned()
            .unwrap_or_default())
    }
}

/// Per-tenant named counters.
#[derive(Debug, Default)]
pub struct MemorySequenceGenerator {
    counters: Mutex<HashMap<(TenantId, String), i64>>,
}

impl MemorySequenceGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceGenerator for MemorySequenceGenerator {
    async fn next_ids(&self, tenant: &TenantId, name: &str, count: usize) -> StoreResult<Vec<i64>> {
        let mut counters = self.counters.lock().await;
        let counter = counters
            .entry((tenant.clone(), name.to_string()))
            .or_insert(0);
        let start = *counter + 1;
        *counter += count as i64;
        Ok((start..=*counter).collect())
    }
}

/// Audit log held in a vector.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl MemoryAuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every appended entry, in append order.
    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl AuditLogStore for MemoryAuditLog {
    async fn append(&self, entries: &[AuditLogEntry]) -> StoreResult<()> {
        self.entries.lock().await.extend_from_slice(entries);
        Ok(())
    }
}

/// Host memberships and topology names.
#[derive(Debug, Default)]
pub struct MemoryTopology {
    relations: RwLock<Vec<HostModuleRelation>>,
    names: RwLock<TopologyNames>,
    host_ips: RwLock<HashMap<i64, String>>,
    default_biz: RwLock<BizId>,
}

impl MemoryTopology {
    #[must_use]
    pub fn new(default_biz: BizId) -> Self {
        Self {
            default_biz: RwLock::new(default_biz),
            ..Self::default()
        }
    }

    /// Replace all memberships of the given hosts.
    pub async fn set_host_relations(&self, host_id: i64, relations: Vec<HostModuleRelation>) {
        let mut guard = self.relations.write().await;
        guard.retain(|r| r.host_id != host_id);
        guard.extend(relations);
    }

    pub async fn set_names(&self, names: TopologyNames) {
        *self.names.write().await = names;
    }

    pub async fn set_host_ip(&self, host_id: i64, ip: impl Into<String>) {
        self.host_ips.write().await.insert(host_id, ip.into());
    }
}

#[async_trait]
impl HostRelationSource for MemoryTopology {
    async fn host_relations(
        &self,
        _tenant: &TenantId,
        host_ids: &[i64],
    ) -> StoreResult<Vec<HostModuleRelation>> {
        let mut found: Vec<HostModuleRelation> = self
            .relations
            .read()
            .await
            .iter()
            .filter(|r| host_ids.contains(&r.host_id))
            .copied()
            .collect();
        found.sort();
        Ok(found)
    }
}

#[async_trait]
impl TopologyNameSource for MemoryTopology {
    async fn default_biz_id(&self, _tenant: &TenantId) -> StoreResult<BizId> {
        Ok(*self.default_biz.read().await)
    }

    async fn names(
        &self,
        _tenant: &TenantId,
        biz_ids: &[i64],
        set_ids: &[i64],
        module_ids: &[i64],
    ) -> StoreResult<TopologyNames> {
        let names = self.names.read().await;
        let pick = |map: &HashMap<i64, String>, ids: &[i64]| -> HashMap<i64, String> {
            map.iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(id, name)| (*id, name.clone()))
                .collect()
        };
        Ok(TopologyNames {
            businesses: pick(&names.businesses, biz_ids),
            sets: pick(&names.sets, set_ids),
            modules: pick(&names.modules, module_ids),
        })
    }

    async fn host_inner_ips(
        &self,
        _tenant: &TenantId,
        host_ids: &[i64],
    ) -> StoreResult<HashMap<i64, String>> {
        Ok(self
            .host_ips
            .read()
            .await
            .iter()
            .filter(|(id, _)| host_ids.contains(id))
            .map(|(id, ip)| (*id, ip.clone()))
            .collect())
    }
}
