//! ClinicOps: HTTP API.
//!
//! Exposes the command bus, the scheduling engines and the read models over
//! axum. The binary in `main.rs` wires these to `PostgreSQL` and runs the
//! projection worker and hold sweeper alongside the server.

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;
