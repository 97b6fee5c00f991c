//! In-memory stores with the same guarantees as the `PostgreSQL` ones.
//!
//! A single mutex per store stands in for the database transaction: an
//! append or a write set is applied entirely under the lock or not at all.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use clinicops_core::clock::{Clock, SystemClock};
use clinicops_core::error::DomainError;
use clinicops_core::event::{Event, EventDraft};
use clinicops_core::read_model::{
    ReadModelRow, ReadModelStore, ReadModelTable, ReadModelWrite, RowFilter,
};
use clinicops_core::store::{
    AppendOutcome, EventStore, ProjectionCheckpoint, ProjectionErrorRecord, Snapshot,
};

#[derive(Default)]
struct LogState {
    events: Vec<Event>,
    checkpoints: HashMap<String, ProjectionCheckpoint>,
    errors: Vec<ProjectionErrorRecord>,
    snapshots: Vec<Snapshot>,
}

impl LogState {
    fn version_of(&self, aggregate_id: Uuid) -> i64 {
        self.events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.aggregate_version)
            .max()
            .unwrap_or(0)
    }

    fn by_causation(&self, causation_id: Uuid) -> Vec<Event> {
        self.events
            .iter()
            .filter(|e| e.metadata.causation_id == causation_id)
            .cloned()
            .collect()
    }

    fn last_sequence(&self) -> i64 {
        self.events.last().map_or(0, |e| e.sequence)
    }
}

/// Event store held in process memory.
pub struct InMemoryEventStore {
    clock: Arc<dyn Clock>,
    state: Mutex<LogState>,
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new(Arc::new(SystemClock))
    }
}

impl InMemoryEventStore {
    /// Creates an empty store stamping events with `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(LogState::default()),
        }
    }

    /// Every event in sequence order (empty if the lock is poisoned).
    #[must_use]
    pub fn all_events(&self) -> Vec<Event> {
        self.lock().map(|s| s.events.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, LogState>, DomainError> {
        self.state
            .lock()
            .map_err(|_| DomainError::Infrastructure("event store lock poisoned".into()))
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_events(&self, drafts: Vec<EventDraft>) -> Result<AppendOutcome, DomainError> {
        let mut state = self.lock()?;

        for key in drafts.iter().filter_map(|d| d.idempotency_key.as_deref()) {
            if let Some(original) = state
                .events
                .iter()
                .find(|e| e.idempotency_key.as_deref() == Some(key))
            {
                let causation_id = original.metadata.causation_id;
                return Ok(AppendOutcome {
                    events: state.by_causation(causation_id),
                    replayed: true,
                });
            }
        }

        let mut next_versions: HashMap<Uuid, i64> = HashMap::new();
        for draft in &drafts {
            let next = *next_versions
                .entry(draft.aggregate_id)
                .or_insert_with(|| state.version_of(draft.aggregate_id) + 1);
            if draft.aggregate_version != next {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id: draft.aggregate_id,
                    expected: draft.aggregate_version - 1,
                    actual: next - 1,
                });
            }
            next_versions.insert(draft.aggregate_id, next + 1);
        }

        let occurred_at = self.clock.now();
        let mut sequence = state.last_sequence();
        let mut events = Vec::with_capacity(drafts.len());
        for draft in drafts {
            sequence += 1;
            events.push(Event {
                event_id: Uuid::new_v4(),
                sequence,
                aggregate_type: draft.aggregate_type,
                aggregate_id: draft.aggregate_id,
                aggregate_version: draft.aggregate_version,
                event_type: draft.event_type,
                schema_version: draft.schema_version,
                payload: draft.payload,
                metadata: draft.metadata,
                tenant_id: draft.tenant_id,
                idempotency_key: draft.idempotency_key,
                occurred_at,
            });
        }
        state.events.extend(events.iter().cloned());

        Ok(AppendOutcome {
            events,
            replayed: false,
        })
    }

    async fn get_aggregate_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        Ok(self.lock()?.version_of(aggregate_id))
    }

    async fn get_aggregate_events(
        &self,
        aggregate_id: Uuid,
        from_version: i64,
    ) -> Result<Vec<Event>, DomainError> {
        let state = self.lock()?;
        let mut events: Vec<Event> = state
            .events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id && e.aggregate_version > from_version)
            .cloned()
            .collect();
        events.sort_by_key(|e| e.aggregate_version);
        Ok(events)
    }

    async fn get_event_by_idempotency_key(&self, key: &str) -> Result<Event, DomainError> {
        self.lock()?
            .events
            .iter()
            .find(|e| e.idempotency_key.as_deref() == Some(key))
            .cloned()
            .ok_or_else(|| DomainError::not_found("idempotency key", key))
    }

    async fn get_events_by_causation(&self, causation_id: Uuid) -> Result<Vec<Event>, DomainError> {
        Ok(self.lock()?.by_causation(causation_id))
    }

    async fn get_projection_checkpoint(
        &self,
        projection_name: &str,
    ) -> Result<ProjectionCheckpoint, DomainError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        Ok(state
            .checkpoints
            .entry(projection_name.to_owned())
            .or_insert_with(|| ProjectionCheckpoint {
                projection_name: projection_name.to_owned(),
                last_sequence: 0,
                updated_at: now,
            })
            .clone())
    }

    async fn get_projection_catchup_events(
        &self,
        projection_name: &str,
        batch_size: i64,
    ) -> Result<Vec<Event>, DomainError> {
        let state = self.lock()?;
        let after = state
            .checkpoints
            .get(projection_name)
            .map_or(0, |c| c.last_sequence);
        let take = usize::try_from(batch_size).unwrap_or(0);
        Ok(state
            .events
            .iter()
            .filter(|e| e.sequence > after)
            .take(take)
            .cloned()
            .collect())
    }

    async fn mark_events_processed(
        &self,
        projection_name: &str,
        sequence: i64,
    ) -> Result<(), DomainError> {
        let now = self.clock.now();
        let mut state = self.lock()?;
        let target = sequence.min(state.last_sequence());
        let checkpoint = state
            .checkpoints
            .entry(projection_name.to_owned())
            .or_insert_with(|| ProjectionCheckpoint {
                projection_name: projection_name.to_owned(),
                last_sequence: 0,
                updated_at: now,
            });
        if target > checkpoint.last_sequence {
            checkpoint.last_sequence = target;
        }
        checkpoint.updated_at = now;
        Ok(())
    }

    async fn record_projection_error(
        &self,
        record: ProjectionErrorRecord,
    ) -> Result<(), DomainError> {
        self.lock()?.errors.push(record);
        Ok(())
    }

    async fn list_projection_errors(
        &self,
        limit: i64,
    ) -> Result<Vec<ProjectionErrorRecord>, DomainError> {
        let take = usize::try_from(limit).unwrap_or(0);
        Ok(self.lock()?.errors.iter().rev().take(take).cloned().collect())
    }

    async fn create_snapshot(&self, snapshot: Snapshot) -> Result<(), DomainError> {
        let mut state = self.lock()?;
        state
            .snapshots
            .retain(|s| !(s.aggregate_id == snapshot.aggregate_id && s.version == snapshot.version));
        state.snapshots.push(snapshot);
        Ok(())
    }

    async fn get_aggregate_with_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<(Option<Snapshot>, Vec<Event>), DomainError> {
        let snapshot = self
            .lock()?
            .snapshots
            .iter()
            .filter(|s| s.aggregate_id == aggregate_id)
            .max_by_key(|s| s.version)
            .cloned();
        let from_version = snapshot.as_ref().map_or(0, |s| s.version);
        let events = self.get_aggregate_events(aggregate_id, from_version).await?;
        Ok((snapshot, events))
    }

    async fn delete_snapshots(&self, aggregate_id: Uuid) -> Result<(), DomainError> {
        self.lock()?.snapshots.retain(|s| s.aggregate_id != aggregate_id);
        Ok(())
    }
}

/// Read-model store held in process memory.
#[derive(Default)]
pub struct InMemoryReadModelStore {
    tables: Mutex<HashMap<ReadModelTable, Vec<ReadModelRow>>>,
}

impl InMemoryReadModelStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<ReadModelTable, Vec<ReadModelRow>>>, DomainError> {
        self.tables
            .lock()
            .map_err(|_| DomainError::Infrastructure("read model lock poisoned".into()))
    }
}

fn apply_write(tables: &mut HashMap<ReadModelTable, Vec<ReadModelRow>>, write: &ReadModelWrite) {
    match write {
        ReadModelWrite::Insert { table, row } => {
            let rows = tables.entry(*table).or_default();
            match rows.iter_mut().find(|r| r.id == row.id) {
                Some(existing) if existing.current_version < row.current_version => {
                    existing.data = row.data.clone();
                    existing.current_version = row.current_version;
                    existing.last_event_id = row.last_event_id;
                    existing.updated_at = row.updated_at;
                }
                Some(_) => {}
                None => rows.push(row.clone()),
            }
        }
        ReadModelWrite::Patch {
            table,
            id,
            patch,
            source,
            at,
        } => {
            let Some(rows) = tables.get_mut(table) else {
                return;
            };
            if let Some(existing) = rows
                .iter_mut()
                .find(|r| r.id == *id && r.current_version < source.version)
            {
                patch.apply_to(&mut existing.data);
                existing.current_version = source.version;
                existing.last_event_id = source.event_id;
                existing.updated_at = *at;
            }
        }
    }
}

#[async_trait]
impl ReadModelStore for InMemoryReadModelStore {
    async fn get(&self, table: ReadModelTable, id: Uuid) -> Result<Option<ReadModelRow>, DomainError> {
        Ok(self
            .lock()?
            .get(&table)
            .and_then(|rows| rows.iter().find(|r| r.id == id))
            .cloned())
    }

    async fn find(
        &self,
        table: ReadModelTable,
        filter: &RowFilter,
    ) -> Result<Vec<ReadModelRow>, DomainError> {
        let tables = self.lock()?;
        let mut rows: Vec<ReadModelRow> = tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        let skip = filter.offset.and_then(|o| usize::try_from(o).ok()).unwrap_or(0);
        let take = filter
            .limit
            .and_then(|l| usize::try_from(l).ok())
            .unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(skip).take(take).collect())
    }

    async fn apply(&self, writes: &[ReadModelWrite]) -> Result<(), DomainError> {
        let mut tables = self.lock()?;
        for write in writes {
            apply_write(&mut tables, write);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use clinicops_core::event::{AggregateType, EventMetadata};
    use clinicops_core::read_model::{Patch, RowSource};
    use clinicops_test_support::{FixedClock, fixed_time};
    use serde_json::json;

    use super::*;

    fn fixed_store() -> InMemoryEventStore {
        InMemoryEventStore::new(Arc::new(FixedClock(fixed_time())))
    }

    fn draft(aggregate_id: Uuid, version: i64, causation_id: Uuid) -> EventDraft {
        EventDraft {
            aggregate_type: AggregateType::Patient,
            aggregate_id,
            aggregate_version: version,
            event_type: "patient_updated".into(),
            schema_version: 1,
            payload: json!({ "version": version }),
            metadata: EventMetadata {
                correlation_id: causation_id,
                causation_id,
                actor_id: None,
                client: None,
                extensions: serde_json::Map::new(),
            },
            tenant_id: Uuid::nil(),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_appends_are_gapless_and_ordered() {
        // Arrange
        let store = fixed_store();
        let id = Uuid::new_v4();

        // Act
        for v in 1..=3 {
            store.append_event(draft(id, v, Uuid::new_v4())).await.unwrap();
        }

        // Assert
        let events = store.get_aggregate_events(id, 0).await.unwrap();
        let versions: Vec<i64> = events.iter().map(|e| e.aggregate_version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(store.get_aggregate_events(id, 2).await.unwrap().len(), 1);
        assert_eq!(store.get_aggregate_version(id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_stale_version_reports_actual() {
        let store = fixed_store();
        let id = Uuid::new_v4();
        store.append_event(draft(id, 1, Uuid::new_v4())).await.unwrap();
        store.append_event(draft(id, 2, Uuid::new_v4())).await.unwrap();

        let result = store.append_event(draft(id, 2, Uuid::new_v4())).await;

        match result {
            Err(DomainError::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("expected ConcurrencyConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_version_gap_is_rejected() {
        let store = fixed_store();
        let id = Uuid::new_v4();

        let result = store.append_event(draft(id, 2, Uuid::new_v4())).await;

        assert!(matches!(result, Err(DomainError::ConcurrencyConflict { actual: 0, .. })));
        assert_eq!(store.get_aggregate_version(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_failed_batch_persists_nothing() {
        let store = fixed_store();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.append_event(draft(b, 1, Uuid::new_v4())).await.unwrap();
        let causation = Uuid::new_v4();

        let result = store
            .append_events(vec![draft(a, 1, causation), draft(b, 1, causation)])
            .await;

        assert!(result.is_err());
        assert_eq!(store.get_aggregate_version(a).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_returns_original() {
        // Arrange
        let store = fixed_store();
        let id = Uuid::new_v4();
        let mut first = draft(id, 1, Uuid::new_v4());
        first.idempotency_key = Some("key-1".into());
        let mut second = draft(Uuid::new_v4(), 1, Uuid::new_v4());
        second.idempotency_key = Some("key-1".into());
        second.payload = json!({ "different": true });

        // Act
        let original = store.append_events(vec![first]).await.unwrap();
        let replay = store.append_events(vec![second]).await.unwrap();

        // Assert
        assert!(!original.replayed);
        assert!(replay.replayed);
        assert_eq!(replay.events[0].event_id, original.events[0].event_id);
        assert_eq!(store.all_events().len(), 1);
        assert_eq!(
            store.get_event_by_idempotency_key("key-1").await.unwrap().event_id,
            original.events[0].event_id
        );
    }

    #[tokio::test]
    async fn test_unknown_idempotency_key_is_not_found() {
        let store = fixed_store();

        let result = store.get_event_by_idempotency_key("missing").await;

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_checkpoint_is_monotonic_and_bounded() {
        let store = fixed_store();
        for _ in 0..3 {
            store
                .append_event(draft(Uuid::new_v4(), 1, Uuid::new_v4()))
                .await
                .unwrap();
        }

        assert_eq!(store.get_projection_checkpoint("main").await.unwrap().last_sequence, 0);
        store.mark_events_processed("main", 2).await.unwrap();
        store.mark_events_processed("main", 1).await.unwrap();
        assert_eq!(store.get_projection_checkpoint("main").await.unwrap().last_sequence, 2);
        store.mark_events_processed("main", 99).await.unwrap();
        assert_eq!(store.get_projection_checkpoint("main").await.unwrap().last_sequence, 3);
    }

    #[tokio::test]
    async fn test_catchup_reads_after_checkpoint() {
        let store = fixed_store();
        for _ in 0..5 {
            store
                .append_event(draft(Uuid::new_v4(), 1, Uuid::new_v4()))
                .await
                .unwrap();
        }
        store.mark_events_processed("main", 2).await.unwrap();

        let batch = store.get_projection_catchup_events("main", 2).await.unwrap();

        let sequences: Vec<i64> = batch.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_snapshot_then_tail_events() {
        let store = fixed_store();
        let id = Uuid::new_v4();
        for v in 1..=4 {
            store.append_event(draft(id, v, Uuid::new_v4())).await.unwrap();
        }
        store
            .create_snapshot(Snapshot {
                aggregate_id: id,
                aggregate_type: AggregateType::Patient,
                version: 3,
                state: json!({ "v": 3 }),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let (snapshot, tail) = store.get_aggregate_with_snapshot(id).await.unwrap();
        assert_eq!(snapshot.map(|s| s.version), Some(3));
        assert_eq!(tail.len(), 1);

        store.delete_snapshots(id).await.unwrap();
        let (snapshot, tail) = store.get_aggregate_with_snapshot(id).await.unwrap();
        assert!(snapshot.is_none());
        assert_eq!(tail.len(), 4);
    }

    fn row(id: Uuid, version: i64, data: serde_json::Value) -> ReadModelRow {
        ReadModelRow {
            id,
            tenant_id: Uuid::nil(),
            data,
            current_version: version,
            last_event_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_read_model_writes_are_version_guarded() {
        // Arrange
        let store = InMemoryReadModelStore::new();
        let id = Uuid::new_v4();
        let insert = ReadModelWrite::Insert {
            table: ReadModelTable::Visits,
            row: row(id, 1, json!({ "status": "scheduled" })),
        };
        let patch = ReadModelWrite::Patch {
            table: ReadModelTable::Visits,
            id,
            patch: Patch::new().set("status", "completed"),
            source: RowSource {
                version: 2,
                event_id: Uuid::new_v4(),
            },
            at: Utc::now(),
        };

        // Act
        store.apply(&[insert.clone(), patch.clone()]).await.unwrap();
        store.apply(&[insert, patch]).await.unwrap();

        // Assert
        let stored = store.get(ReadModelTable::Visits, id).await.unwrap().unwrap();
        assert_eq!(stored.current_version, 2);
        assert_eq!(stored.data["status"], "completed");
    }

    #[tokio::test]
    async fn test_patch_of_missing_row_is_skipped() {
        let store = InMemoryReadModelStore::new();
        let id = Uuid::new_v4();

        store
            .apply(&[ReadModelWrite::Patch {
                table: ReadModelTable::Patients,
                id,
                patch: Patch::new().set("phone", "1"),
                source: RowSource {
                    version: 2,
                    event_id: Uuid::new_v4(),
                },
                at: Utc::now(),
            }])
            .await
            .unwrap();

        assert!(store.get(ReadModelTable::Patients, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_filters_and_pages() {
        let store = InMemoryReadModelStore::new();
        let writes: Vec<ReadModelWrite> = (0..4)
            .map(|i| ReadModelWrite::Insert {
                table: ReadModelTable::AppointmentSlots,
                row: row(
                    Uuid::new_v4(),
                    1,
                    json!({ "status": if i % 2 == 0 { "available" } else { "blocked" } }),
                ),
            })
            .collect();
        store.apply(&writes).await.unwrap();

        let available = store
            .find(
                ReadModelTable::AppointmentSlots,
                &RowFilter::for_tenant(Uuid::nil()).field("status", "available"),
            )
            .await
            .unwrap();
        let paged = store
            .find(
                ReadModelTable::AppointmentSlots,
                &RowFilter::default().page(3, 2),
            )
            .await
            .unwrap();

        assert_eq!(available.len(), 2);
        assert_eq!(paged.len(), 2);
    }

    #[tokio::test]
    async fn test_find_applies_date_range_before_paging() {
        // Arrange
        let store = InMemoryReadModelStore::new();
        let writes: Vec<ReadModelWrite> = (1..=5)
            .map(|day| ReadModelWrite::Insert {
                table: ReadModelTable::AppointmentSlots,
                row: row(Uuid::new_v4(), 1, json!({ "date": format!("2026-02-0{day}") })),
            })
            .collect();
        store.apply(&writes).await.unwrap();
        let feb = |day| chrono::NaiveDate::from_ymd_opt(2026, 2, day).unwrap();

        // Act
        let rows = store
            .find(
                ReadModelTable::AppointmentSlots,
                &RowFilter::default()
                    .at_least("date", feb(2))
                    .at_most("date", feb(4))
                    .page(10, 1),
            )
            .await
            .unwrap();

        // Assert
        let dates: Vec<&str> = rows.iter().filter_map(|r| r.data["date"].as_str()).collect();
        assert_eq!(dates.len(), 2);
        assert!(dates.iter().all(|d| ["2026-02-02", "2026-02-03", "2026-02-04"].contains(d)));
    }
}
