//! Host memberships and topology names.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::FromRow;

use cmdb_core::{fields, BizId, TenantId};
use cmdb_reconcile::reconciler::HOST_OBJECT_TYPE;
use cmdb_reconcile::topology::TopologyNames;
use cmdb_reconcile::{
    HostModuleRelation, HostRelationSource, StoreError, StoreResult, TopologyNameSource,
};

use crate::error::query_failed;
use crate::pool::DbPool;

#[derive(Debug, FromRow)]
struct RelationRow {
    host_id: i64,
    biz_id: i64,
    set_id: i64,
    module_id: i64,
}

#[derive(Debug, FromRow)]
struct NodeRow {
    node_kind: String,
    node_id: i64,
    name: String,
}

fn collect_names(rows: Vec<NodeRow>) -> TopologyNames {
    let mut names = TopologyNames::default();
    for row in rows {
        let target = match row.node_kind.as_str() {
            "biz" => &mut names.businesses,
            "set" => &mut names.sets,
            "module" => &mut names.modules,
            _ => continue,
        };
        target.insert(row.node_id, row.name);
    }
    names
}

/// Postgres-backed topology lookups.
#[derive(Debug, Clone)]
pub struct PgTopology {
    pool: DbPool,
}

impl PgTopology {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HostRelationSource for PgTopology {
    async fn host_relations(
        &self,
        tenant: &TenantId,
        host_ids: &[i64],
    ) -> StoreResult<Vec<HostModuleRelation>> {
        let rows = sqlx::query_as::<_, RelationRow>(
            r"
            SELECT host_id, biz_id, set_id, module_id
            FROM cmdb_host_module
            WHERE tenant = $1 AND host_id = ANY($2)
            ORDER BY host_id, biz_id, set_id, module_id
            ",
        )
        .bind(tenant.as_str())
        .bind(host_ids)
        .fetch_all(self.pool.inner())
        .await
        .map_err(|e| query_failed("load host relations", e))?;

        Ok(rows
            .into_iter()
            .map(|r| HostModuleRelation::new(r.host_id, r.biz_id, r.set_id, r.module_id))
            .collect())
    }
}

#[async_trait]
impl TopologyNameSource for PgTopology {
    async fn default_biz_id(&self, tenant: &TenantId) -> StoreResult<BizId> {
        let id: Option<i64> = sqlx::query_scalar(
            r"
            SELECT node_id FROM cmdb_topology_node
            WHERE tenant = $1 AND node_kind = 'biz' AND is_default
            ORDER BY node_id
            LIMIT 1
            ",
        )
        .bind(tenant.as_str())
        .fetch_optional(self.pool.inner())
        .await
        .map_err(|e| query_failed("load default business", e))?;

        id.map(BizId::new)
            .ok_or_else(|| StoreError::backend(format!("tenant {tenant} has no default business")))
    }

    async fn names(
        &self,
        tenant: &TenantId,
        biz_ids: &[i64],
        set_ids: &[i64],
        module_ids: &[i64],
    ) -> StoreResult<TopologyNames> {
        let rows = sqlx::query_as::<_, NodeRow>(
            r"
            SELECT node_kind, node_id, name
            FROM cmdb_topology_node
            WHERE tenant = $1
              AND ((node_kind = 'biz' AND node_id = ANY($2))
                OR (node_kind = 'set' AND node_id = ANY($3))
                OR (node_kind = 'module' AND node_id = ANY($4)))
            ",
        )
        .bind(tenant.as_str())
        .bind(biz_ids)
        .bind(set_ids)
        .bind(module_ids)
        .fetch_all(self.pool.inner())
        .await
        .map_err(|e| query_failed("load topology names", e))?;

        Ok(collect_names(rows))
    }

    async fn host_inner_ips(
        &self,
        tenant: &TenantId,
        host_ids: &[i64],
    ) -> StoreResult<HashMap<i64, String>> {
        let rows: Vec<(i64, Option<String>)> = sqlx::query_as(
            r"
            SELECT instance_id, data ->> $3::text
            FROM cmdb_instances
            WHERE tenant = $1 AND object_type = $2 AND instance_id = ANY($4)
            ",
        )
        .bind(tenant.as_str())
        .bind(HOST_OBJECT_TYPE)
        .bind(fields::HOST_INNER_IP)
        .bind(host_ids)
        .fetch_all(self.pool.inner())
        .await
        .map_err(|e| query_failed("load host addresses", e))?;

        Ok(rows
            .into_iter()
            .filter_map(|(id, ip)| ip.map(|ip| (id, ip)))
            .collect())
    }
}
