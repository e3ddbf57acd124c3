//! Model metadata over `cmdb_object_unique` and `cmdb_object_attribute`.

use async_trait::async_trait;
use sqlx::FromRow;

use cmdb_core::{ObjectType, TenantId};
use cmdb_reconcile::{AttributeMeta, AttributeType, ModelMetadata, StoreResult, UniqueRule};

use crate::error::query_failed;
use crate::pool::DbPool;

#[derive(Debug, FromRow)]
struct UniqueRuleRow {
    id: i64,
    object_type: String,
    keys: Vec<i64>,
    must_check: bool,
}

impl From<UniqueRuleRow> for UniqueRule {
    fn from(row: UniqueRuleRow) -> Self {
        UniqueRule {
            id: row.id,
            object_type: ObjectType::from(row.object_type),
            keys: row.keys,
            must_check: row.must_check,
        }
    }
}

#[derive(Debug, FromRow)]
struct AttributeRow {
    id: i64,
    object_type: String,
    property_id: String,
    property_name: String,
    property_type: String,
}

impl From<AttributeRow> for AttributeMeta {
    fn from(row: AttributeRow) -> Self {
        AttributeMeta::new(
            row.id,
            row.object_type,
            row.property_id,
            row.property_name,
            AttributeType::from(row.property_type),
        )
    }
}

/// Postgres-backed [`ModelMetadata`].
#[derive(Debug, Clone)]
pub struct PgModelMetadata {
    pool: DbPool,
}

impl PgModelMetadata {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ModelMetadata for PgModelMetadata {
    async fn must_check_rules(
        &self,
        object_type: &ObjectType,
        tenant: &TenantId,
    ) -> StoreResult<Vec<UniqueRule>> {
        let rows = sqlx::query_as::<_, UniqueRuleRow>(
            r"
            SELECT id, object_type, keys, must_check
            FROM cmdb_object_unique
            WHERE tenant = $1 AND object_type = $2 AND must_check
            ORDER BY id
            ",
        )
        .bind(tenant.as_str())
        .bind(object_type.as_str())
        .fetch_all(self.pool.inner())
        .await
        .map_err(|e| query_failed("load unique rules", e))?;

        Ok(rows.into_iter().map(UniqueRule::from).collect())
    }

    async fn attributes(
        &self,
        object_type: &ObjectType,
        tenant: &TenantId,
    ) -> StoreResult<Vec<AttributeMeta>> {
        let rows = sqlx::query_as::<_, AttributeRow>(
            r"
            SELECT id, object_type, property_id, property_name, property_type
            FROM cmdb_object_attribute
            WHERE tenant = $1 AND object_type = $2
            ORDER BY id
            ",
        )
        .bind(tenant.as_str())
        .bind(object_type.as_str())
        .fetch_all(self.pool.inner())
        .await
        .map_err(|e| query_failed("load attributes", e))?;

        Ok(rows.into_iter().map(AttributeMeta::from).collect())
    }
}
