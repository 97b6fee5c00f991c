//! Domain layer: commands, events, aggregates and read-model rows.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod read_models;
