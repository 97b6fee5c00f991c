//! Shared test clocks, failing stores and fixtures for ClinicOps.

mod clock;
mod fixtures;
mod store;

pub use clock::{FixedClock, MockClock};
pub use fixtures::{command, fixed_time, metadata, test_tenant};
pub use store::{FailingEventStore, FailingReadModelStore, SnapshotRefusingStore};
