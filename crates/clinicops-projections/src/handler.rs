//! The projection handler trait and the write builders handlers share.

use clinicops_core::event::{DomainEvent, Event};
use clinicops_core::read_model::{Patch, ReadModelRow, ReadModelTable, ReadModelWrite, RowSource};
use serde::Serialize;
use uuid::Uuid;

use crate::error::ProjectionError;

/// Turns events into read-model writes for the tables it owns.
///
/// Handlers are pure: they never read the store. Every write they return is
/// version-guarded, so replaying an event already applied changes nothing.
pub trait ProjectionHandler: Send + Sync {
    /// Name recorded against failures.
    fn name(&self) -> &'static str;

    /// Event types this handler consumes.
    fn event_types(&self) -> &'static [&'static str];

    /// Produces the writes for one event.
    ///
    /// # Errors
    ///
    /// Returns `ProjectionError` if the event cannot be decoded or its rows
    /// cannot be encoded.
    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError>;
}

/// Decodes a stored event into its typed enum.
pub(crate) fn decode<E: DomainEvent>(event: &Event) -> Result<E, ProjectionError> {
    E::decode(event).map_err(|e| ProjectionError::Decode {
        event_type: event.event_type.clone(),
        reason: e.to_string(),
    })
}

/// Inserts a full row stamped with the event's own version.
pub(crate) fn insert<T: Serialize>(
    table: ReadModelTable,
    event: &Event,
    id: Uuid,
    row: &T,
) -> Result<ReadModelWrite, ProjectionError> {
    insert_at(table, event, id, event.aggregate_version, row)
}

/// Inserts a full row stamped with an explicit version.
pub(crate) fn insert_at<T: Serialize>(
    table: ReadModelTable,
    event: &Event,
    id: Uuid,
    version: i64,
    row: &T,
) -> Result<ReadModelWrite, ProjectionError> {
    let data = serde_json::to_value(row).map_err(|e| ProjectionError::Encode {
        table: table.as_str(),
        reason: e.to_string(),
    })?;
    Ok(ReadModelWrite::Insert {
        table,
        row: ReadModelRow {
            id,
            tenant_id: event.tenant_id,
            data,
            current_version: version,
            last_event_id: event.event_id,
            created_at: event.occurred_at,
            updated_at: event.occurred_at,
        },
    })
}

/// Merges the non-null fields of `changes` into an existing row.
pub(crate) fn patch<T: Serialize>(
    table: ReadModelTable,
    event: &Event,
    id: Uuid,
    changes: &T,
) -> Result<ReadModelWrite, ProjectionError> {
    let patch = Patch::from_serializable(changes).map_err(|e| ProjectionError::Encode {
        table: table.as_str(),
        reason: e.to_string(),
    })?;
    Ok(with_patch(table, event, id, patch))
}

/// Advances a row's version without changing its data.
pub(crate) fn touch(table: ReadModelTable, event: &Event, id: Uuid) -> ReadModelWrite {
    with_patch(table, event, id, Patch::new())
}

fn with_patch(table: ReadModelTable, event: &Event, id: Uuid, patch: Patch) -> ReadModelWrite {
    ReadModelWrite::Patch {
        table,
        id,
        patch,
        source: RowSource {
            version: event.aggregate_version,
            event_id: event.event_id,
        },
        at: event.occurred_at,
    }
}

/// Patch body for records that only change status.
#[derive(Serialize)]
pub(crate) struct StatusChange<S: Serialize> {
    pub status: S,
}
