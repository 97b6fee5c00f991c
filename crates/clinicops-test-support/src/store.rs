//! Failing stores: exercise infrastructure error paths.

use std::sync::Arc;

use async_trait::async_trait;
use clinicops_core::error::DomainError;
use clinicops_core::event::{Event, EventDraft};
use clinicops_core::read_model::{ReadModelRow, ReadModelStore, ReadModelTable, ReadModelWrite, RowFilter};
use clinicops_core::store::{
    AppendOutcome, EventStore, ProjectionCheckpoint, ProjectionErrorRecord, Snapshot,
};
use uuid::Uuid;

fn refused<T>() -> Result<T, DomainError> {
    Err(DomainError::Infrastructure("connection refused".into()))
}

/// An event store whose every operation returns an infrastructure error.
#[derive(Debug)]
pub struct FailingEventStore;

#[async_trait]
impl EventStore for FailingEventStore {
    async fn append_events(&self, _drafts: Vec<EventDraft>) -> Result<AppendOutcome, DomainError> {
        refused()
    }

    async fn get_aggregate_version(&self, _aggregate_id: Uuid) -> Result<i64, DomainError> {
        refused()
    }

    async fn get_aggregate_events(
        &self,
        _aggregate_id: Uuid,
        _from_version: i64,
    ) -> Result<Vec<Event>, DomainError> {
        refused()
    }

    async fn get_event_by_idempotency_key(&self, _key: &str) -> Result<Event, DomainError> {
        refused()
    }

    async fn get_events_by_causation(&self, _causation_id: Uuid) -> Result<Vec<Event>, DomainError> {
        refused()
    }

    async fn get_projection_checkpoint(
        &self,
        _projection_name: &str,
    ) -> Result<ProjectionCheckpoint, DomainError> {
        refused()
    }

    async fn get_projection_catchup_events(
        &self,
        _projection_name: &str,
        _batch_size: i64,
    ) -> Result<Vec<Event>, DomainError> {
        refused()
    }

    async fn mark_events_processed(
        &self,
        _projection_name: &str,
        _sequence: i64,
    ) -> Result<(), DomainError> {
        refused()
    }

    async fn record_projection_error(
        &self,
        _record: ProjectionErrorRecord,
    ) -> Result<(), DomainError> {
        refused()
    }

    async fn list_projection_errors(
        &self,
        _limit: i64,
    ) -> Result<Vec<ProjectionErrorRecord>, DomainError> {
        refused()
    }

    async fn create_snapshot(&self, _snapshot: Snapshot) -> Result<(), DomainError> {
        refused()
    }

    async fn get_aggregate_with_snapshot(
        &self,
        _aggregate_id: Uuid,
    ) -> Result<(Option<Snapshot>, Vec<Event>), DomainError> {
        refused()
    }

    async fn delete_snapshots(&self, _aggregate_id: Uuid) -> Result<(), DomainError> {
        refused()
    }
}

/// A read-model store whose every operation returns an infrastructure error.
#[derive(Debug)]
pub struct FailingReadModelStore;

#[async_trait]
impl ReadModelStore for FailingReadModelStore {
    async fn get(&self, _table: ReadModelTable, _id: Uuid) -> Result<Option<ReadModelRow>, DomainError> {
        refused()
    }

    async fn find(
        &self,
        _table: ReadModelTable,
        _filter: &RowFilter,
    ) -> Result<Vec<ReadModelRow>, DomainError> {
        refused()
    }

    async fn apply(&self, _writes: &[ReadModelWrite]) -> Result<(), DomainError> {
        refused()
    }
}

/// Delegates to an inner event store but refuses every snapshot write.
pub struct SnapshotRefusingStore {
    inner: Arc<dyn EventStore>,
}

impl SnapshotRefusingStore {
    #[must_use]
    pub fn new(inner: Arc<dyn EventStore>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl EventStore for SnapshotRefusingStore {
    async fn append_events(&self, drafts: Vec<EventDraft>) -> Result<AppendOutcome, DomainError> {
        self.inner.append_events(drafts).await
    }

    async fn get_aggregate_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        self.inner.get_aggregate_version(aggregate_id).await
    }

    async fn get_aggregate_events(
        &self,
        aggregate_id: Uuid,
        from_version: i64,
    ) -> Result<Vec<Event>, DomainError> {
        self.inner.get_aggregate_events(aggregate_id, from_version).await
    }

    async fn get_event_by_idempotency_key(&self, key: &str) -> Result<Event, DomainError> {
        self.inner.get_event_by_idempotency_key(key).await
    }

    async fn get_events_by_causation(&self, causation_id: Uuid) -> Result<Vec<Event>, DomainError> {
        self.inner.get_events_by_causation(causation_id).await
    }

    async fn get_projection_checkpoint(
        &self,
        projection_name: &str,
    ) -> Result<ProjectionCheckpoint, DomainError> {
        self.inner.get_projection_checkpoint(projection_name).await
    }

    async fn get_projection_catchup_events(
        &self,
        projection_name: &str,
        batch_size: i64,
    ) -> Result<Vec<Event>, DomainError> {
        self.inner
            .get_projection_catchup_events(projection_name, batch_size)
            .await
    }

    async fn mark_events_processed(
        &self,
        projection_name: &str,
        sequence: i64,
    ) -> Result<(), DomainError> {
        self.inner.mark_events_processed(projection_name, sequence).await
    }

    async fn record_projection_error(
        &self,
        record: ProjectionErrorRecord,
    ) -> Result<(), DomainError> {
        self.inner.record_projection_error(record).await
    }

    async fn list_projection_errors(
        &self,
        limit: i64,
    ) -> Result<Vec<ProjectionErrorRecord>, DomainError> {
        self.inner.list_projection_errors(limit).await
    }

    async fn create_snapshot(&self, _snapshot: Snapshot) -> Result<(), DomainError> {
        refused()
    }

    async fn get_aggregate_with_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<(Option<Snapshot>, Vec<Event>), DomainError> {
        self.inner.get_aggregate_with_snapshot(aggregate_id).await
    }

    async fn delete_snapshots(&self, aggregate_id: Uuid) -> Result<(), DomainError> {
        self.inner.delete_snapshots(aggregate_id).await
    }
}
