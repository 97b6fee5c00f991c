//! `PostgreSQL` implementation of the `ReadModelStore` trait.
//!
//! Table names come from the closed [`ReadModelTable`] enumeration, so they
//! are interpolated into SQL directly; every value is bound.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::instrument;
use uuid::Uuid;

use clinicops_core::error::DomainError;
use clinicops_core::read_model::{
    RangeOp, RangeValue, ReadModelRow, ReadModelStore, ReadModelTable, ReadModelWrite, RowFilter,
};

use crate::pg_event_store::db_error;

const ROW_COLUMNS: &str =
    "id, tenant_id, data, current_version, last_event_id, created_at, updated_at";

/// PostgreSQL-backed read-model store.
#[derive(Debug, Clone)]
pub struct PgReadModelStore {
    pool: PgPool,
}

impl PgReadModelStore {
    /// Creates a new `PgReadModelStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ReadModelStore for PgReadModelStore {
    async fn get(&self, table: ReadModelTable, id: Uuid) -> Result<Option<ReadModelRow>, DomainError> {
        let row = sqlx::query(&format!("SELECT {ROW_COLUMNS} FROM {table} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.as_ref().map(row_from_pg).transpose()
    }

    async fn find(
        &self,
        table: ReadModelTable,
        filter: &RowFilter,
    ) -> Result<Vec<ReadModelRow>, DomainError> {
        let mut qb = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ROW_COLUMNS} FROM {table} WHERE TRUE"
        ));
        if let Some(tenant_id) = filter.tenant_id {
            qb.push(" AND tenant_id = ").push_bind(tenant_id);
        }
        if !filter.equals.is_empty() {
            qb.push(" AND data @> ")
                .push_bind(serde_json::Value::Object(filter.equals.clone()));
        }
        for range in &filter.ranges {
            let op = match range.op {
                RangeOp::AtLeast => " >= ",
                RangeOp::AtMost => " <= ",
            };
            qb.push(" AND (data->>").push_bind(range.field.clone());
            match range.value {
                RangeValue::Date(date) => {
                    qb.push(")::date").push(op).push_bind(date);
                }
                RangeValue::Timestamp(at) => {
                    qb.push(")::timestamptz").push(op).push_bind(at);
                }
            }
        }
        qb.push(" ORDER BY created_at ASC, id ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(offset);
        }

        let rows = qb.build().fetch_all(&self.pool).await.map_err(db_error)?;
        rows.iter().map(row_from_pg).collect()
    }

    #[instrument(skip(self, writes), fields(count = writes.len()))]
    async fn apply(&self, writes: &[ReadModelWrite]) -> Result<(), DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for write in writes {
            match write {
                ReadModelWrite::Insert { table, row } => {
                    sqlx::query(&format!(
                        "INSERT INTO {table} ({ROW_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
                         ON CONFLICT (id) DO UPDATE SET data = EXCLUDED.data, \
                         current_version = EXCLUDED.current_version, \
                         last_event_id = EXCLUDED.last_event_id, \
                         updated_at = EXCLUDED.updated_at \
                         WHERE {table}.current_version < EXCLUDED.current_version"
                    ))
                    .bind(row.id)
                    .bind(row.tenant_id)
                    .bind(&row.data)
                    .bind(row.current_version)
                    .bind(row.last_event_id)
                    .bind(row.created_at)
                    .bind(row.updated_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error)?;
                }
                ReadModelWrite::Patch {
                    table,
                    id,
                    patch,
                    source,
                    at,
                } => {
                    sqlx::query(&format!(
                        "UPDATE {table} SET data = data || $2, current_version = $3, \
                         last_event_id = $4, updated_at = $5 \
                         WHERE id = $1 AND current_version < $3"
                    ))
                    .bind(id)
                    .bind(serde_json::Value::Object(patch.fields().clone()))
                    .bind(source.version)
                    .bind(source.event_id)
                    .bind(at)
                    .execute(&mut *tx)
                    .await
                    .map_err(db_error)?;
                }
            }
        }
        tx.commit().await.map_err(db_error)
    }
}

fn row_from_pg(row: &PgRow) -> Result<ReadModelRow, DomainError> {
    Ok(ReadModelRow {
        id: row.try_get("id").map_err(db_error)?,
        tenant_id: row.try_get("tenant_id").map_err(db_error)?,
        data: row.try_get("data").map_err(db_error)?,
        current_version: row.try_get("current_version").map_err(db_error)?,
        last_event_id: row.try_get("last_event_id").map_err(db_error)?,
        created_at: row.try_get("created_at").map_err(db_error)?,
        updated_at: row.try_get("updated_at").map_err(db_error)?,
    })
}
