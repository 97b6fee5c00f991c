//! Command and metadata fixtures.

use chrono::{DateTime, TimeZone, Utc};
use clinicops_core::command::{Command, CommandMetadata};
use uuid::Uuid;

/// The instant every deterministic test starts from: 2026-01-15 10:00 UTC.
///
/// # Panics
///
/// Never in practice; the literal date is valid.
#[must_use]
pub fn fixed_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
}

/// A stable tenant id shared by tests that need one.
#[must_use]
pub fn test_tenant() -> Uuid {
    Uuid::from_u128(0x00c1_1a1c_0000_4000_8000_0000_0000_0001)
}

/// Metadata for the test tenant with a fresh actor.
#[must_use]
pub fn metadata() -> CommandMetadata {
    let mut metadata = CommandMetadata::for_tenant(test_tenant());
    metadata.actor_id = Some(Uuid::new_v4());
    metadata
}

/// A command for the test tenant.
#[must_use]
pub fn command(command_type: &str, payload: serde_json::Value) -> Command {
    Command::new(command_type, metadata(), payload)
}
