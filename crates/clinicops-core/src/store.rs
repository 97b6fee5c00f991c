//! Event store abstraction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::event::{AggregateType, Event, EventDraft};

/// Result of an append.
#[derive(Debug, Clone)]
pub struct AppendOutcome {
    /// The persisted events, in sequence order.
    pub events: Vec<Event>,
    /// `true` if an idempotency key matched a prior append and `events` are
    /// the originals.
    pub replayed: bool,
}

/// Durable progress marker for a projection group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionCheckpoint {
    /// Projection group name.
    pub projection_name: String,
    /// Last dispatched global sequence (0 before the first event).
    pub last_sequence: i64,
    /// When the checkpoint last moved.
    pub updated_at: DateTime<Utc>,
}

/// Diagnostic record for a failed projection handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionErrorRecord {
    /// Failing event.
    pub event_id: Uuid,
    /// Global sequence of the failing event.
    pub event_sequence: i64,
    /// Event type of the failing event.
    pub event_type: String,
    /// Handler that failed.
    pub projection_name: String,
    /// Error message.
    pub message: String,
    /// Structured details.
    pub details: serde_json::Value,
    /// When the failure was recorded.
    pub recorded_at: DateTime<Utc>,
}

/// Cached aggregate state at a version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Aggregate the snapshot belongs to.
    pub aggregate_id: Uuid,
    /// Aggregate type.
    pub aggregate_type: AggregateType,
    /// Version of the last event folded into `state`.
    pub version: i64,
    /// Serialized aggregate state.
    pub state: serde_json::Value,
    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,
}

/// Append-only event log with optimistic concurrency and idempotency.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Appends drafts atomically: all are persisted or none are.
    ///
    /// Each draft's `aggregate_version` must be exactly one past the
    /// aggregate's current version (counting earlier drafts in the batch).
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if a version is already
    /// taken. An idempotency key that already exists is not an error: the
    /// original events come back with `replayed = true`.
    async fn append_events(&self, drafts: Vec<EventDraft>) -> Result<AppendOutcome, DomainError>;

    /// Appends a single draft.
    ///
    /// # Errors
    ///
    /// See [`EventStore::append_events`].
    async fn append_event(&self, draft: EventDraft) -> Result<Event, DomainError> {
        let outcome = self.append_events(vec![draft]).await?;
        outcome
            .events
            .into_iter()
            .next()
            .ok_or_else(|| DomainError::Infrastructure("append returned no events".into()))
    }

    /// Current version of an aggregate (0 if it has no events).
    async fn get_aggregate_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError>;

    /// Events of an aggregate with version greater than `from_version`,
    /// ascending.
    async fn get_aggregate_events(
        &self,
        aggregate_id: Uuid,
        from_version: i64,
    ) -> Result<Vec<Event>, DomainError>;

    /// Looks up the event carrying an idempotency key.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if no event carries the key.
    async fn get_event_by_idempotency_key(&self, key: &str) -> Result<Event, DomainError>;

    /// All events caused by one command, in sequence order.
    async fn get_events_by_causation(&self, causation_id: Uuid) -> Result<Vec<Event>, DomainError>;

    /// Reads (creating at zero if absent) a projection checkpoint.
    async fn get_projection_checkpoint(
        &self,
        projection_name: &str,
    ) -> Result<ProjectionCheckpoint, DomainError>;

    /// Up to `batch_size` events strictly after the projection's checkpoint.
    async fn get_projection_catchup_events(
        &self,
        projection_name: &str,
        batch_size: i64,
    ) -> Result<Vec<Event>, DomainError>;

    /// Advances the checkpoint. Never moves it backwards.
    async fn mark_events_processed(
        &self,
        projection_name: &str,
        sequence: i64,
    ) -> Result<(), DomainError>;

    /// Appends a projection failure to the diagnostic log.
    async fn record_projection_error(&self, record: ProjectionErrorRecord)
    -> Result<(), DomainError>;

    /// Most recent projection failures, newest first.
    async fn list_projection_errors(
        &self,
        limit: i64,
    ) -> Result<Vec<ProjectionErrorRecord>, DomainError>;

    /// Stores a snapshot.
    async fn create_snapshot(&self, snapshot: Snapshot) -> Result<(), DomainError>;

    /// Latest snapshot plus the events strictly after it (all events when no
    /// snapshot exists).
    async fn get_aggregate_with_snapshot(
        &self,
        aggregate_id: Uuid,
    ) -> Result<(Option<Snapshot>, Vec<Event>), DomainError>;

    /// Drops every snapshot of an aggregate.
    async fn delete_snapshots(&self, aggregate_id: Uuid) -> Result<(), DomainError>;
}
