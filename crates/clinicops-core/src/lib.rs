//! ClinicOps Core: shared event-sourcing abstractions.
//!
//! This crate defines the traits and types every bounded context depends on:
//! events and their metadata, commands and handlers, the event-store and
//! read-model ports, and the domain error type. It contains no
//! infrastructure code.

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod read_model;
pub mod store;
