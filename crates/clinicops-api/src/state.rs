//! Shared application state.

use std::sync::Arc;

use clinicops_command_bus::CommandBus;
use clinicops_core::clock::Clock;
use clinicops_core::error::DomainError;
use clinicops_core::read_model::ReadModelStore;
use clinicops_core::store::EventStore;
use clinicops_scheduling::application::holds::HoldEngine;
use clinicops_scheduling::application::slot_generation::SlotGenerationEngine;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Entry point for every state change.
    pub bus: Arc<CommandBus>,
    /// The event log.
    pub store: Arc<dyn EventStore>,
    /// Projected tables.
    pub read_models: Arc<dyn ReadModelStore>,
    /// Slot generation and regeneration.
    pub slots: Arc<SlotGenerationEngine>,
    /// Hold placement and release.
    pub holds: Arc<HoldEngine>,
}

impl AppState {
    /// Wires a command bus with every context's handlers and the engines
    /// that dispatch through it.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` if two handlers claim the same
    /// command type.
    pub fn new(
        store: Arc<dyn EventStore>,
        read_models: Arc<dyn ReadModelStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DomainError> {
        let bus = CommandBus::builder(store.clone(), clock)
            .register_all(clinicops_clinical::application::command_handlers::command_handlers())
            .register_all(clinicops_scheduling::application::command_handlers::command_handlers())
            .build()?;
        let bus = Arc::new(bus);
        Ok(Self {
            slots: Arc::new(SlotGenerationEngine::new(bus.clone(), read_models.clone())),
            holds: Arc::new(HoldEngine::new(bus.clone(), read_models.clone())),
            bus,
            store,
            read_models,
        })
    }
}
