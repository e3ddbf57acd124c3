//! Topology-Change Classifier
//!
//! Hosts live in a business -> set -> module hierarchy. When a host's
//! module memberships change, the audit records *why* from the before and
//! after snapshots alone:
//!
//! | previous business | current business | action     | audited business |
//! |-------------------|------------------|------------|------------------|
//! | default           | other            | `Assign`   | current          |
//! | other             | default          | `Unassign` | previous         |
//! | anything else     |                  | `Transfer` | current          |
//!
//! A host without current membership is audited under its previous
//! business. A host without previous membership is treated as coming from
//! the default business. A host listed under several businesses is audited
//! under the lowest one.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use cmdb_core::{BizId, TenantId};

use crate::audit::{
    AuditAction, AuditError, AuditLogEntry, AuditRecorder, AuditSubject, HostRelationAudit,
};
use crate::context::RequestContext;
use crate::store::{StoreError, StoreResult};

/// One host-in-module membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostModuleRelation {
    pub host_id: i64,
    pub biz_id: BizId,
    pub set_id: i64,
    pub module_id: i64,
}

impl HostModuleRelation {
    #[must_use]
    pub fn new(host_id: i64, biz_id: i64, set_id: i64, module_id: i64) -> Self {
        Self {
            host_id,
            biz_id: BizId::new(biz_id),
            set_id,
            module_id,
        }
    }
}

/// Why a host's membership changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TopologyAction {
    Assign,
    Unassign,
    Transfer,
}

impl From<TopologyAction> for AuditAction {
    fn from(action: TopologyAction) -> Self {
        match action {
            TopologyAction::Assign => AuditAction::Assign,
            TopologyAction::Unassign => AuditAction::Unassign,
            TopologyAction::Transfer => AuditAction::Transfer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRef {
    #[serde(rename = "bk_module_id")]
    pub module_id: i64,
    #[serde(rename = "bk_module_name")]
    pub module_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetTopology {
    #[serde(rename = "bk_set_id")]
    pub set_id: i64,
    #[serde(rename = "bk_set_name")]
    pub set_name: String,
    #[serde(rename = "module")]
    pub modules: Vec<ModuleRef>,
}

/// A host's position in one business.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BizTopology {
    #[serde(rename = "bk_biz_id")]
    pub biz_id: BizId,
    #[serde(rename = "bk_biz_name")]
    pub biz_name: String,
    #[serde(rename = "set")]
    pub sets: Vec<SetTopology>,
}

impl BizTopology {
    /// A snapshot with no sets.
    #[must_use]
    pub fn empty(biz_id: BizId) -> Self {
        Self {
            biz_id,
            biz_name: String::new(),
            sets: Vec::new(),
        }
    }
}

/// Display names of topology nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopologyNames {
    pub businesses: HashMap<i64, String>,
    pub sets: HashMap<i64, String>,
    pub modules: HashMap<i64, String>,
}

impl TopologyNames {
    fn name(map: &HashMap<i64, String>, id: i64) -> String {
        map.get(&id).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn biz_name(&self, biz_id: BizId) -> String {
        Self::name(&self.businesses, biz_id.get())
    }

    #[must_use]
    pub fn set_name(&self, set_id: i64) -> String {
        Self::name(&self.sets, set_id)
    }

    #[must_use]
    pub fn module_name(&self, module_id: i64) -> String {
        Self::name(&self.modules, module_id)
    }
}

/// A classified membership change of one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyChange {
    pub host_id: i64,
    pub action: TopologyAction,
    /// Business the audit entry is filed under.
    pub audit_biz_id: BizId,
    pub previous: BizTopology,
    pub current: BizTopology,
}

/// Classify a business transition.
///
/// Returns the action and the business to audit under.
#[must_use]
pub fn classify(
    previous: Option<BizId>,
    current: Option<BizId>,
    default_biz: BizId,
) -> (TopologyAction, BizId) {
    let prev = previous.unwrap_or(default_biz);
    let Some(cur) = current else {
        return (TopologyAction::Transfer, prev);
    };

    if prev != cur && prev == default_biz {
        (TopologyAction::Assign, cur)
    } else if prev != cur && cur == default_biz {
        (TopologyAction::Unassign, prev)
    } else {
        (TopologyAction::Transfer, cur)
    }
}

/// The business a host belongs to; the lowest id when several are listed.
fn business_of(relations: &[&HostModuleRelation]) -> Option<BizId> {
    relations.iter().map(|r| r.biz_id).min()
}

fn snapshot(
    biz_id: BizId,
    relations: &[&HostModuleRelation],
    names: &TopologyNames,
) -> BizTopology {
    let dropped = relations.iter().filter(|r| r.biz_id != biz_id).count();
    if let (Some(first), true) = (relations.first(), dropped > 0) {
        warn!(
            host_id = first.host_id,
            biz_id = biz_id.get(),
            dropped,
            "Host spans several businesses, memberships outside the audited one are left out"
        );
    }

    let mut by_set: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
    for rel in relations.iter().filter(|r| r.biz_id == biz_id) {
        by_set.entry(rel.set_id).or_default().insert(rel.module_id);
    }

    BizTopology {
        biz_id,
        biz_name: names.biz_name(biz_id),
        sets: by_set
            .into_iter()
            .map(|(set_id, modules)| SetTopology {
                set_id,
                set_name: names.set_name(set_id),
                modules: modules
                    .into_iter()
                    .map(|module_id| ModuleRef {
                        module_id,
                        module_name: names.module_name(module_id),
                    })
                    .collect(),
            })
            .collect(),
    }
}

/// Classify every host present in either snapshot, ordered by host id.
#[must_use]
pub fn classify_changes(
    previous: &[HostModuleRelation],
    current: &[HostModuleRelation],
    default_biz: BizId,
    names: &TopologyNames,
) -> Vec<TopologyChange> {
    let hosts: BTreeSet<i64> = previous
        .iter()
        .chain(current.iter())
        .map(|r| r.host_id)
        .collect();

    hosts
        .into_iter()
        .map(|host_id| {
            let prev: Vec<&HostModuleRelation> =
                previous.iter().filter(|r| r.host_id == host_id).collect();
            let cur: Vec<&HostModuleRelation> =
                current.iter().filter(|r| r.host_id == host_id).collect();

            let prev_biz = business_of(&prev);
            let cur_biz = business_of(&cur);
            let (action, audit_biz_id) = classify(prev_biz, cur_biz, default_biz);

            TopologyChange {
                host_id,
                action,
                audit_biz_id,
                previous: snapshot(prev_biz.unwrap_or(default_biz), &prev, names),
                current: match cur_biz {
                    Some(biz) => snapshot(biz, &cur, names),
                    None => BizTopology::empty(BizId::default()),
                },
            }
        })
        .collect()
}

/// Host-to-module membership lookup.
#[async_trait]
pub trait HostRelationSource: Send + Sync {
    async fn host_relations(
        &self,
        tenant: &TenantId,
        host_ids: &[i64],
    ) -> StoreResult<Vec<HostModuleRelation>>;
}

/// Topology display-name lookup.
#[async_trait]
pub trait TopologyNameSource: Send + Sync {
    /// Id of the tenant's built-in default business.
    async fn default_biz_id(&self, tenant: &TenantId) -> StoreResult<BizId>;

    async fn names(
        &self,
        tenant: &TenantId,
        biz_ids: &[i64],
        set_ids: &[i64],
        module_ids: &[i64],
    ) -> StoreResult<TopologyNames>;

    async fn host_inner_ips(
        &self,
        tenant: &TenantId,
        host_ids: &[i64],
    ) -> StoreResult<HashMap<i64, String>>;
}

/// Errors raised while auditing topology changes.
#[derive(Debug, Error)]
pub enum TopologyAuditError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Audit(#[from] AuditError),
}

/// Memberships captured before a topology mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySnapshot {
    pub tenant: TenantId,
    pub host_ids: Vec<i64>,
    pub relations: Vec<HostModuleRelation>,
}

/// Audits host transfers: capture before the mutation, save after it.
#[derive(Clone)]
pub struct HostTransferAudit {
    relations: Arc<dyn HostRelationSource>,
    names: Arc<dyn TopologyNameSource>,
    recorder: AuditRecorder,
}

impl HostTransferAudit {
    #[must_use]
    pub fn new(
        relations: Arc<dyn HostRelationSource>,
        names: Arc<dyn TopologyNameSource>,
        recorder: AuditRecorder,
    ) -> Self {
        Self {
            relations,
            names,
            recorder,
        }
    }

    /// Capture the current memberships of `host_ids`.
    #[instrument(skip(self, host_ids), fields(tenant = %tenant, hosts = host_ids.len()))]
    pub async fn capture(
        &self,
        tenant: &TenantId,
        host_ids: Vec<i64>,
    ) -> Result<TopologySnapshot, TopologyAuditError> {
        let relations = self.relations.host_relations(tenant, &host_ids).await?;
        debug!(relations = relations.len(), "Captured previous host topology");
        Ok(TopologySnapshot {
            tenant: tenant.clone(),
            host_ids,
            relations,
        })
    }

    /// Compare the captured memberships with the current ones and record
    /// one entry per host.
    #[instrument(skip(self, previous, ctx), fields(rid = %ctx.request_id))]
    pub async fn save(
        &self,
        previous: TopologySnapshot,
        ctx: &RequestContext,
    ) -> Result<Vec<AuditLogEntry>, TopologyAuditError> {
        let tenant = &previous.tenant;
        let current = self
            .relations
            .host_relations(tenant, &previous.host_ids)
            .await?;
        let default_biz = self.names.default_biz_id(tenant).await?;

        let all = previous.relations.iter().chain(current.iter());
        let biz_ids: BTreeSet<i64> = all.clone().map(|r| r.biz_id.get()).collect();
        let set_ids: BTreeSet<i64> = all.clone().map(|r| r.set_id).collect();
        let module_ids: BTreeSet<i64> = all.map(|r| r.module_id).collect();

        let names = self
            .names
            .names(
                tenant,
                &biz_ids.into_iter().collect::<Vec<_>>(),
                &set_ids.into_iter().collect::<Vec<_>>(),
                &module_ids.into_iter().collect::<Vec<_>>(),
            )
            .await?;
        let ips = self
            .names
            .host_inner_ips(tenant, &previous.host_ids)
            .await?;

        let changes = classify_changes(&previous.relations, &current, default_biz, &names);
        let subjects: Vec<AuditSubject> = changes
            .into_iter()
            .map(|change| {
                let ip = ips.get(&change.host_id).cloned().unwrap_or_default();
                AuditSubject::HostRelation(HostRelationAudit::from_change(change, ip))
            })
            .collect();

        let entries = self.recorder.record_batch(subjects, ctx).await?;
        debug!(entries = entries.len(), "Recorded host topology changes");
        Ok(entries)
    }
}
