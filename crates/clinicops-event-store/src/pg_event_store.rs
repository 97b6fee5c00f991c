//! `PostgreSQL` implementation of the `EventStore` trait.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{instrument, warn};
use uuid::Uuid;

use clinicops_core::error::DomainError;
use clinicops_core::event::{AggregateType, Event, EventDraft, EventMetadata};
use clinicops_core::store::{
    AppendOutcome, EventStore, ProjectionCheckpoint, ProjectionErrorRecord, Snapshot,
};

use crate::schema::{
    AGGREGATE_VERSION_CONSTRAINT, APPEND_LOCK_KEY, CHECKPOINTS_TABLE, EVENT_COLUMNS, EVENTS_TABLE,
    IDEMPOTENCY_KEY_CONSTRAINT, PROJECTION_ERRORS_TABLE, SNAPSHOTS_TABLE,
};

/// PostgreSQL-backed event store.
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Creates a new `PgEventStore`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn version_in_tx(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: Uuid,
    ) -> Result<i64, DomainError> {
        sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COALESCE(MAX(aggregate_version), 0) FROM {EVENTS_TABLE} WHERE aggregate_id = $1"
        ))
        .bind(aggregate_id)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_error)
    }

    async fn insert_draft(
        tx: &mut Transaction<'_, Postgres>,
        draft: &EventDraft,
    ) -> Result<Event, sqlx::Error> {
        let metadata = serde_json::to_value(&draft.metadata)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let row = sqlx::query(&format!(
            "INSERT INTO {EVENTS_TABLE} (event_id, aggregate_type, aggregate_id, aggregate_version, \
             event_type, schema_version, payload, metadata, tenant_id, correlation_id, \
             causation_id, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {EVENT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(draft.aggregate_type.as_str())
        .bind(draft.aggregate_id)
        .bind(draft.aggregate_version)
        .bind(&draft.event_type)
        .bind(draft.schema_version)
        .bind(&draft.payload)
        .bind(metadata)
        .bind(draft.tenant_id)
        .bind(draft.metadata.correlation_id)
        .bind(draft.metadata.causation_id)
        .bind(draft.idempotency_key.as_deref())
        .fetch_one(&mut **tx)
        .await?;
        event_from_row(&row).map_err(|e| sqlx::Error::Decode(Box::new(e)))
    }

    async fn replay(&self, key: &str) -> Result<AppendOutcome, DomainError> {
        let original = self.get_event_by_idempotency_key(key).await?;
        let events = self
            .get_events_by_causation(original.metadata.causation_id)
            .await?;
        warn!(idempotency_key = key, "idempotent replay");
        Ok(AppendOutcome {
            events,
            replayed: true,
        })
    }

    async fn resolve_insert_failure(
        &self,
        draft: &EventDraft,
        error: sqlx::Error,
    ) -> Result<AppendOutcome, DomainError> {
        match violated_constraint(&error).as_deref() {
            Some(AGGREGATE_VERSION_CONSTRAINT) => {
                let actual = self.get_aggregate_version(draft.aggregate_id).await?;
                warn!(
                    aggregate_id = %draft.aggregate_id,
                    expected = draft.aggregate_version - 1,
                    actual,
                    "version conflict on append"
                );
                Err(DomainError::ConcurrencyConflict {
                    aggregate_id: draft.aggregate_id,
                    expected: draft.aggregate_version - 1,
                    actual,
                })
            }
            Some(IDEMPOTENCY_KEY_CONSTRAINT) => match draft.idempotency_key.as_deref() {
                Some(key) => self.replay(key).await,
                None => Err(db_error(error)),
            },
            _ => Err(db_error(error)),
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    #[instrument(skip(self, drafts), fields(count = drafts.len()))]
    async fn append_events(&self, drafts: Vec<EventDraft>) -> Result<AppendOutcome, DomainError> {
        if drafts.is_empty() {
            return Ok(AppendOutcome {
                events: Vec::new(),
                replayed: false,
            });
        }

        for key in drafts.iter().filter_map(|d| d.idempotency_key.as_deref()) {
            match self.replay(key).await {
                Ok(outcome) => return Ok(outcome),
                Err(DomainError::NotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let mut tx = self.pool.begin().await.map_err(db_error)?;
        // Held until commit: a sequence drawn later can never commit first,
        // so catch-up readers never step over an in-flight append.
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(APPEND_LOCK_KEY)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        let mut next_versions: HashMap<Uuid, i64> = HashMap::new();
        let mut events = Vec::with_capacity(drafts.len());

        for draft in &drafts {
            let next = match next_versions.get(&draft.aggregate_id) {
                Some(v) => *v,
                None => Self::version_in_tx(&mut tx, draft.aggregate_id).await? + 1,
            };
            if draft.aggregate_version != next {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id: draft.aggregate_id,
                    expected: draft.aggregate_version - 1,
                    actual: next - 1,
                });
            }

            match Self::insert_draft(&mut tx, draft).await {
                Ok(event) => events.push(event),
                Err(e) => {
                    tx.rollback().await.map_err(db_error)?;
                    return self.resolve_insert_failure(draft, e).await;
                }
            }
            next_versions.insert(draft.aggregate_id, next + 1);
        }

        tx.commit().await.map_err(db_error)?;

        Ok(AppendOutcome {
            events,
            replayed: false,
        })
    }

    async fn get_aggregate_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        sqlx::query_scalar::<_, i64>(&format!(
            "SELECT COALESCE(MAX(aggregate_version), 0) FROM {EVENTS_TABLE} WHERE aggregate_id = $1"
        ))
        .bind(aggregate_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }

    async fn get_aggregate_events(
        &self,
        aggregate_id: Uuid,
        from_version: i64,
    ) -> Result<Vec<Event>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} \
             WHERE aggregate_id = $1 AND aggregate_version > $2 \
             ORDER BY aggregate_version ASC"
        ))
        .bind(aggregate_id)
        .bind(from_version)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(event_from_row).collect()
    }

    async fn get_event_by_idempotency_key(&self, key: &str) -> Result<Event, DomainError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        match row {
            Some(row) => event_from_row(&row),
            None => Err(DomainError::not_found("idempotency key", key)),
        }
    }

    async fn get_events_by_causation(&self, causation_id: Uuid) -> Result<Vec<Event>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} WHERE causation_id = $1 ORDER BY sequence ASC"
        ))
        .bind(causation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(event_from_row).collect()
    }

    async fn get_projection_checkpoint(
        &self,
        projection_name: &str,
    ) -> Result<ProjectionCheckpoint, DomainError> {
        sqlx::query(&format!(
            "INSERT INTO {CHECKPOINTS_TABLE} (projection_name, last_sequence) VALUES ($1, 0) \
             ON CONFLICT (projection_name) DO NOTHING"
        ))
        .bind(projection_name)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        let row = sqlx::query(&format!(
            "SELECT projection_name, last_sequence, updated_at FROM {CHECKPOINTS_TABLE} \
             WHERE projection_name = $1"
        ))
        .bind(projection_name)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(ProjectionCheckpoint {
            projection_name: row.try_get("projection_name").map_err(db_error)?,
            last_sequence: row.try_get("last_sequence").map_err(db_error)?,
            updated_at: row.try_get("updated_at").map_err(db_error)?,
        })
    }

    async fn get_projection_catchup_events(
        &self,
        projection_name: &str,
        batch_size: i64,
    ) -> Result<Vec<Event>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM {EVENTS_TABLE} \
             WHERE sequence > COALESCE( \
                 (SELECT last_sequence FROM {CHECKPOINTS_TABLE} WHERE projection_name = $1), 0) \
             ORDER BY sequence ASC LIMIT $2"
        ))
        .bind(projection_name)
        .bind(batch_size)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;
        rows.iter().map(event_from_row).collect()
    }

    async fn mark_events_processed(
        &self,
        projection_name: &str,
        sequence: i64,
    ) -> Result<(), DomainError> {
        sqlx::query(&format!(
            "INSERT INTO {CHECKPOINTS_TABLE} (projection_name, last_sequence, updated_at) \
             VALUES ($1, LEAST($2, (SELECT COALESCE(MAX(sequence), 0) FROM {EVENTS_TABLE})), NOW()) \
             ON CONFLICT (projection_name) DO UPDATE \
             SET last_sequence = GREATEST({CHECKPOINTS_TABLE}.last_sequence, EXCLUDED.last_sequence), \
                 updated_at = NOW()"
        ))
        .bind(projection_name)
        .bind(sequence)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn record_projection_error(
        &self,
        record: ProjectionErrorRecord,
    ) -> Result<(), DomainError> {
        sqlx::query(&format!(
            "INSERT INTO {PROJECTION_ERRORS_TABLE} \
             (event_id, event_sequence, event_type, projection_name, message, details, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(record.event_id)
        .bind(record.event_sequence)
        .bind(&record.event_type)
        .bind(&record.projection_name)
        .bind(&record.message)
        .bind(&record.details)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn list_projection_errors(
        &self,
        limit: i64,
    ) -> Result<Vec<ProjectionErrorRecord>, DomainError> {
        let rows = sqlx::query(&format!(
            "SELECT event_id, event_sequence, event_type, projection_name, message, details, \
             recorded_at FROM {PROJECTION_ERRORS_TABLE} ORDER BY id DESC LIMIT $1"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        rows.iter()
            .map(|row| {
                Ok(ProjectionErrorRecord {
                    event_id: row.try_get("event_id").map_err(db_error)?,
                    event_sequence: row.try_get("event_sequence").map_err(db_error)?,
                    event_type: row.try_get("event_type").map_err(db_error)?,
                    projection_name: row.try_get("projection_name").map_err(db_error)?,
                    message: row.try_get("message").map_err(db_error)?,
                    details: row.try_get("details").map_err(db_error)?,
                    recorded_at: row.try_get("recorded_at").map_err(db_error)?,
                })
            })
            .collect()
    }

    async fn create_snapshot(&self, snapshot: Snapshot) -> Result<(), DomainError> {
        sqlx::query(&format!(
            "INSERT INTO {SNAPSHOTS_TABLE} (aggregate_id, aggregate_type, version, state, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (aggregate_id, version) DO UPDATE SET state = EXCLUDED.state, \
             created_at = EXCLUDED.created_at"
        ))
        .bind(snapshot.aggregate_id)
        .bind(snapshot.aggregate_type.as_str())
        .bind(snapshot.version)
        .bind(&snapshot.state)
        .bind(snapshot.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_aggregate_with_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<(Option<Snapshot>, Vec<Event>), DomainError> {
        let row = sqlx::query(&format!(
            "SELECT aggregate_id, aggregate_type, version, state, created_at FROM {SNAPSHOTS_TABLE} \
             WHERE aggregate_id = $1 ORDER BY version DESC LIMIT 1"
        ))
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        let snapshot = match row {
            Some(row) => {
                let aggregate_type: String = row.try_get("aggregate_type").map_err(db_error)?;
                Some(Snapshot {
                    aggregate_id: row.try_get("aggregate_id").map_err(db_error)?,
                    aggregate_type: aggregate_type.parse()?,
                    version: row.try_get("version").map_err(db_error)?,
                    state: row.try_get("state").map_err(db_error)?,
                    created_at: row.try_get("created_at").map_err(db_error)?,
                })
            }
            None => None,
        };
        let from_version = snapshot.as_ref().map_or(0, |s| s.version);
        let events = self.get_aggregate_events(aggregate_id, from_version).await?;
        Ok((snapshot, events))
    }

    async fn delete_snapshots(&self, aggregate_id: Uuid) -> Result<(), DomainError> {
        sqlx::query(&format!("DELETE FROM {SNAPSHOTS_TABLE} WHERE aggregate_id = $1"))
            .bind(aggregate_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

fn event_from_row(row: &PgRow) -> Result<Event, DomainError> {
    let aggregate_type: String = row.try_get("aggregate_type").map_err(db_error)?;
    let metadata: serde_json::Value = row.try_get("metadata").map_err(db_error)?;
    let metadata: EventMetadata = serde_json::from_value(metadata)
        .map_err(|e| DomainError::Infrastructure(format!("event metadata does not decode: {e}")))?;
    Ok(Event {
        event_id: row.try_get("event_id").map_err(db_error)?,
        sequence: row.try_get("sequence").map_err(db_error)?,
        aggregate_type: aggregate_type.parse::<AggregateType>()?,
        aggregate_id: row.try_get("aggregate_id").map_err(db_error)?,
        aggregate_version: row.try_get("aggregate_version").map_err(db_error)?,
        event_type: row.try_get("event_type").map_err(db_error)?,
        schema_version: row.try_get("schema_version").map_err(db_error)?,
        payload: row.try_get("payload").map_err(db_error)?,
        metadata,
        tenant_id: row.try_get("tenant_id").map_err(db_error)?,
        idempotency_key: row.try_get("idempotency_key").map_err(db_error)?,
        occurred_at: row.try_get("occurred_at").map_err(db_error)?,
    })
}

fn violated_constraint(error: &sqlx::Error) -> Option<String> {
    error
        .as_database_error()
        .filter(|db| db.is_unique_violation())
        .and_then(|db| db.constraint().map(str::to_owned))
}

pub(crate) fn db_error(error: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(format!("database error: {error}"))
}
