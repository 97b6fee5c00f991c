//! Domain layer for the Scheduling context.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod read_models;
pub mod slot_planning;
