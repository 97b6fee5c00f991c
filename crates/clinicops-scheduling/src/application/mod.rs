//! Application layer for the Scheduling context.

pub mod command_handlers;
pub mod holds;
pub mod query_handlers;
pub mod slot_generation;
