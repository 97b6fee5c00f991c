//! ClinicOps Command Bus: routes commands to handlers and appends their
//! events with idempotency and optimistic concurrency guarantees.

pub mod bus;

pub use bus::{CommandBus, CommandBusBuilder};
