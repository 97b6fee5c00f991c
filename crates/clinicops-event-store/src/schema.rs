//! Event store table and constraint names shared by the SQL in this crate.
//!
//! The DDL itself lives in the workspace `migrations/` directory and is
//! applied with `sqlx::migrate!`.

/// Append-only event log.
pub const EVENTS_TABLE: &str = "events";

/// Per-group projection progress.
pub const CHECKPOINTS_TABLE: &str = "projection_checkpoints";

/// Projection failure log.
pub const PROJECTION_ERRORS_TABLE: &str = "projection_errors";

/// Cached aggregate state.
pub const SNAPSHOTS_TABLE: &str = "aggregate_snapshots";

/// Transaction-scoped advisory lock every append holds, so `sequence` values
/// become visible in the order they were drawn.
pub const APPEND_LOCK_KEY: i64 = 0x0c11_1c0e_5e90_0001;

/// Unique (`aggregate_id`, `aggregate_version`) constraint.
pub const AGGREGATE_VERSION_CONSTRAINT: &str = "uq_events_aggregate_version";

/// Unique `idempotency_key` constraint.
pub const IDEMPOTENCY_KEY_CONSTRAINT: &str = "uq_events_idempotency_key";

/// Column list selected whenever a full event is read.
pub const EVENT_COLUMNS: &str = "sequence, event_id, aggregate_type, aggregate_id, \
     aggregate_version, event_type, schema_version, payload, metadata, tenant_id, \
     idempotency_key, occurred_at";
