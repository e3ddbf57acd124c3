//! CI instance store over `cmdb_instances`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use tracing::debug;

use cmdb_core::{CiDocument, Condition, InstanceId, ObjectType};
use cmdb_reconcile::context::DEFAULT_TENANT;
use cmdb_reconcile::{CiStore, StoreError, StoreResult};

use crate::error::query_failed;
use crate::pool::DbPool;
use crate::sql::render_condition;

/// Allocates the instance id and stamps it into the document in one statement.
const INSERT_INSTANCE: &str = r"
    WITH next AS (
        SELECT nextval(pg_get_serial_sequence('cmdb_instances', 'instance_id')) AS id
    )
    INSERT INTO cmdb_instances (instance_id, tenant, object_type, data)
    SELECT next.id, $1, $2, $3 || jsonb_build_object('bk_inst_id', next.id)
    FROM next
    RETURNING instance_id
";

fn select_sql(clause: &str) -> String {
    format!(
        "SELECT data FROM cmdb_instances WHERE object_type = $1 AND {clause} \
         ORDER BY instance_id LIMIT 1"
    )
}

fn update_sql(clause: &str) -> String {
    format!(
        "UPDATE cmdb_instances SET data = data || $2, last_time = now() \
         WHERE object_type = $1 AND {clause}"
    )
}

/// Postgres-backed [`CiStore`].
#[derive(Debug, Clone)]
pub struct PgCiStore {
    pool: DbPool,
}

impl PgCiStore {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CiStore for PgCiStore {
    async fn read_one(
        &self,
        object_type: &ObjectType,
        condition: &Condition,
    ) -> StoreResult<Option<CiDocument>> {
        let filter = render_condition(condition, 2);
        let sql = select_sql(&filter.clause);

        let mut query = sqlx::query_scalar::<_, Value>(&sql).bind(object_type.as_str());
        for bind in filter.binds {
            query = query.bind(bind);
        }

        let data = query
            .fetch_optional(self.pool.inner())
            .await
            .map_err(|e| query_failed("read instance", e))?;

        data.map(CiDocument::from_value)
            .transpose()
            .map_err(StoreError::from)
    }

    async fn create(
        &self,
        object_type: &ObjectType,
        document: &CiDocument,
    ) -> StoreResult<InstanceId> {
        let tenant = document
            .tenant()
            .map_or_else(|| DEFAULT_TENANT.to_string(), |t| t.to_string());

        let id: i64 = sqlx::query_scalar(INSERT_INSTANCE)
            .bind(&tenant)
            .bind(object_type.as_str())
            .bind(Json(document))
            .fetch_one(self.pool.inner())
            .await
            .map_err(|e| query_failed("create instance", e))?;

        debug!(object_type = %object_type, tenant = %tenant, instance_id = id, "Inserted instance");
        Ok(InstanceId::new(id))
    }

    async fn update_by_condition(
        &self,
        object_type: &ObjectType,
        condition: &Condition,
        changes: &CiDocument,
    ) -> StoreResult<u64> {
        let filter = render_condition(condition, 3);
        let sql = update_sql(&filter.clause);

        let mut query = sqlx::query(&sql)
            .bind(object_type.as_str())
            .bind(Json(changes));
        for bind in filter.binds {
            query = query.bind(bind);
        }

        let result = query
            .execute(self.pool.inner())
            .await
            .map_err(|e| query_failed("update instances", e))?;
        Ok(result.rows_affected())
    }
}
