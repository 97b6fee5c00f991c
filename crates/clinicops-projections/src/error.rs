//! Projection error type.

use clinicops_core::error::DomainError;
use thiserror::Error;

/// Why a projection handler could not produce its writes.
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// The stored payload does not match the event type.
    #[error("cannot decode {event_type} event: {reason}")]
    Decode {
        /// Event type of the failing event.
        event_type: String,
        /// Decoder message.
        reason: String,
    },

    /// The handler was routed an event type it does not consume.
    #[error("{handler} does not consume {event_type}")]
    Unhandled {
        /// Handler name.
        handler: &'static str,
        /// Event type it was given.
        event_type: String,
    },

    /// A row or patch could not be serialized.
    #[error("cannot encode {table} row: {reason}")]
    Encode {
        /// Target table.
        table: &'static str,
        /// Serializer message.
        reason: String,
    },

    /// The read-model store rejected the writes.
    #[error(transparent)]
    Store(#[from] DomainError),
}
