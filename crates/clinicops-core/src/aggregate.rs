//! Aggregate root abstraction.

use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DomainError;
use crate::event::{DomainEvent, Event};
use crate::store::{EventStore, Snapshot};

/// Number of replayed events past the latest snapshot that triggers a new one.
pub const SNAPSHOT_INTERVAL: usize = 50;

/// Trait for aggregate roots that reconstitute from event history.
pub trait AggregateRoot: Send + Sync + Sized {
    /// The event type this aggregate consumes.
    type Event: DomainEvent;

    /// Returns an empty aggregate at version 0.
    fn new(aggregate_id: Uuid) -> Self;

    /// Returns the aggregate identifier.
    fn aggregate_id(&self) -> Uuid;

    /// Returns the current version (number of events applied).
    fn version(&self) -> i64;

    /// Folds one event into state and bumps the version.
    fn apply(&mut self, event: &Self::Event);
}

/// Rebuilds an aggregate from its stored events.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if an event payload does not decode.
pub fn reconstitute<A: AggregateRoot>(aggregate_id: Uuid, events: &[Event]) -> Result<A, DomainError> {
    let mut aggregate = A::new(aggregate_id);
    apply_all(&mut aggregate, events)?;
    Ok(aggregate)
}

fn apply_all<A: AggregateRoot>(aggregate: &mut A, events: &[Event]) -> Result<(), DomainError> {
    for stored in events {
        let event = A::Event::decode(stored)?;
        aggregate.apply(&event);
    }
    Ok(())
}

/// Loads an aggregate that must exist and belong to `tenant_id`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` if the stream is empty or owned
/// by another tenant.
pub async fn load_aggregate<A: AggregateRoot>(
    store: &dyn EventStore,
    tenant_id: Uuid,
    aggregate_id: Uuid,
) -> Result<A, DomainError> {
    let events = store.get_aggregate_events(aggregate_id, 0).await?;
    match events.first() {
        Some(first) if first.tenant_id == tenant_id => reconstitute(aggregate_id, &events),
        _ => Err(DomainError::AggregateNotFound(aggregate_id)),
    }
}

/// Loads an aggregate from its latest snapshot plus later events, returning
/// an empty aggregate for an empty stream.
///
/// Writes a fresh snapshot when at least [`SNAPSHOT_INTERVAL`] events had to
/// be replayed. A failed snapshot write is logged and the loaded aggregate is
/// still returned; the next load simply replays from the older snapshot.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the snapshot or an event cannot be
/// decoded, or the store fails to read.
pub async fn load_aggregate_with_snapshot<A>(
    store: &dyn EventStore,
    clock: &dyn Clock,
    aggregate_id: Uuid,
) -> Result<A, DomainError>
where
    A: AggregateRoot + Serialize + DeserializeOwned,
{
    let (snapshot, events) = store.get_aggregate_with_snapshot(aggregate_id).await?;
    let mut aggregate = match snapshot {
        Some(snapshot) => serde_json::from_value::<A>(snapshot.state).map_err(|e| {
            DomainError::Infrastructure(format!(
                "snapshot for {aggregate_id} at version {} does not decode: {e}",
                snapshot.version
            ))
        })?,
        None => A::new(aggregate_id),
    };
    apply_all(&mut aggregate, &events)?;

    if events.len() >= SNAPSHOT_INTERVAL {
        let state = serde_json::to_value(&aggregate)
            .map_err(|e| DomainError::Infrastructure(format!("snapshot serialization failed: {e}")))?;
        let written = store
            .create_snapshot(Snapshot {
                aggregate_id,
                aggregate_type: A::Event::AGGREGATE_TYPE,
                version: aggregate.version(),
                state,
                created_at: clock.now(),
            })
            .await;
        match written {
            Ok(()) => tracing::debug!(%aggregate_id, version = aggregate.version(), "snapshot written"),
            Err(e) => tracing::warn!(
                %aggregate_id,
                version = aggregate.version(),
                error = %e,
                "snapshot write failed, continuing without it"
            ),
        }
    }

    Ok(aggregate)
}
