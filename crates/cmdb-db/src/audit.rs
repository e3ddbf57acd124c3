//! Audit log and id sequences over `cmdb_audit_log` and `cmdb_id_generator`.

use async_trait::async_trait;
use tracing::debug;

use cmdb_core::TenantId;
use cmdb_reconcile::{AuditLogEntry, AuditLogStore, SequenceGenerator, StoreError, StoreResult};

use crate::error::query_failed;
use crate::pool::DbPool;

const INSERT_AUDIT_ENTRY: &str = r"
    INSERT INTO cmdb_audit_log
        (id, tenant, audit_type, resource_type, action, user_name, request_id,
         app_code, biz_id, resource_id, resource_name, operation_detail, operation_time)
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
";

/// Advances a counter by `count` and returns its new value.
const ADVANCE_SEQUENCE: &str = r"
    INSERT INTO cmdb_id_generator (tenant, name, seq)
    VALUES ($1, $2, $3)
    ON CONFLICT (tenant, name)
    DO UPDATE SET seq = cmdb_id_generator.seq + EXCLUDED.seq
    RETURNING seq
";

/// The `count` ids ending at `last`, ascending.
fn reserved_range(last: i64, count: usize) -> Vec<i64> {
    let first = last - count as i64 + 1;
    (first..=last).collect()
}

/// Postgres-backed [`AuditLogStore`]. A batch is appended in one transaction.
#[derive(Debug, Clone)]
pub struct PgAuditLogStore {
    pool: DbPool,
}

impl PgAuditLogStore {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditLogStore for PgAuditLogStore {
    async fn append(&self, entries: &[AuditLogEntry]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .inner()
            .begin()
            .await
            .map_err(|e| query_failed("begin audit transaction", e))?;

        for entry in entries {
            let detail = serde_json::to_value(&entry.operation_detail)?;
            sqlx::query(INSERT_AUDIT_ENTRY)
                .bind(entry.id)
                .bind(entry.tenant.as_str())
                .bind(entry.audit_type.as_str())
                .bind(entry.resource_type.as_str())
                .bind(entry.action.as_str())
                .bind(&entry.user)
                .bind(&entry.request_id)
                .bind(&entry.app_code)
                .bind(entry.biz_id.get())
                .bind(entry.resource_id)
                .bind(&entry.resource_name)
                .bind(detail)
                .bind(entry.operation_time)
                .execute(&mut *tx)
                .await
                .map_err(|e| query_failed("insert audit entry", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| query_failed("commit audit transaction", e))?;

        debug!(count = entries.len(), "Appended audit entries");
        Ok(())
    }
}

/// Postgres-backed [`SequenceGenerator`].
///
/// A single upsert reserves the whole range, so ids of one call are
/// contiguous.
#[derive(Debug, Clone)]
pub struct PgSequenceGenerator {
    pool: DbPool,
}

impl PgSequenceGenerator {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SequenceGenerator for PgSequenceGenerator {
    async fn next_ids(&self, tenant: &TenantId, name: &str, count: usize) -> StoreResult<Vec<i64>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let step = i64::try_from(count)
            .map_err(|_| StoreError::backend(format!("cannot reserve {count} ids")))?;

        let last: i64 = sqlx::query_scalar(ADVANCE_SEQUENCE)
            .bind(tenant.as_str())
            .bind(name)
            .bind(step)
            .fetch_one(self.pool.inner())
            .await
            .map_err(|e| query_failed("advance sequence", e))?;

        Ok(reserved_range(last, count))
    }
}
