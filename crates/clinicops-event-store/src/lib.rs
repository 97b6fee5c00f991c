//! ClinicOps Event Store: persistence adapters for the core ports.
//!
//! `PostgreSQL` implementations back production; the in-memory
//! implementations honour the same invariants and back tests and local runs.

pub mod in_memory;
pub mod pg_event_store;
pub mod pg_read_model_store;
pub mod schema;

pub use in_memory::{InMemoryEventStore, InMemoryReadModelStore};
pub use pg_event_store::PgEventStore;
pub use pg_read_model_store::PgReadModelStore;
