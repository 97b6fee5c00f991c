//! The command bus.
//!
//! Per command: idempotency check, handler lookup, expected-version check,
//! handler execution, one atomic append. Any failure before the append
//! leaves the log untouched.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use clinicops_core::clock::Clock;
use clinicops_core::command::{Command, CommandHandler, CommandResult, HandlerContext};
use clinicops_core::error::DomainError;
use clinicops_core::event::Event;
use clinicops_core::store::EventStore;

/// Collects handler registrations and rejects duplicates.
pub struct CommandBusBuilder {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    handlers: Vec<Arc<dyn CommandHandler>>,
}

impl CommandBusBuilder {
    /// Registers one handler.
    #[must_use]
    pub fn register(mut self, handler: Arc<dyn CommandHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Registers every handler in `handlers`.
    #[must_use]
    pub fn register_all(mut self, handlers: impl IntoIterator<Item = Arc<dyn CommandHandler>>) -> Self {
        self.handlers.extend(handlers);
        self
    }

    /// Builds the bus.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` if two handlers share a command
    /// type.
    pub fn build(self) -> Result<CommandBus, DomainError> {
        let mut handlers: HashMap<&'static str, Arc<dyn CommandHandler>> = HashMap::new();
        for handler in self.handlers {
            let command_type = handler.command_type();
            if handlers.insert(command_type, handler).is_some() {
                return Err(DomainError::Configuration(format!(
                    "duplicate handler for command type {command_type}"
                )));
            }
        }
        Ok(CommandBus {
            store: self.store,
            clock: self.clock,
            handlers,
        })
    }
}

/// Routes commands to their handlers and persists the resulting events.
pub struct CommandBus {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    handlers: HashMap<&'static str, Arc<dyn CommandHandler>>,
}

impl CommandBus {
    /// Starts a builder over `store` and `clock`.
    #[must_use]
    pub fn builder(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> CommandBusBuilder {
        CommandBusBuilder {
            store,
            clock,
            handlers: Vec::new(),
        }
    }

    /// The event store this bus appends to.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn EventStore> {
        &self.store
    }

    /// The clock handlers see.
    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Registered command types, sorted.
    #[must_use]
    pub fn command_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Handles one command.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Configuration` for an unregistered command type,
    /// `DomainError::ConcurrencyConflict` when the expected version does not
    /// match, and any error the handler or store raises. A repeated
    /// idempotency key is not an error: the original result is returned with
    /// `replayed = true`.
    #[instrument(
        skip(self, command),
        fields(
            command_id = %command.command_id,
            command_type = %command.command_type,
            tenant_id = %command.metadata.tenant_id,
        )
    )]
    pub async fn handle(&self, command: Command) -> Result<CommandResult, DomainError> {
        if let Some(key) = command.idempotency_key.as_deref() {
            if let Some(result) = self.replay(key, command.tenant_id()).await? {
                return Ok(result);
            }
        }

        let handler = self
            .handlers
            .get(command.command_type.as_str())
            .ok_or_else(|| {
                DomainError::Configuration(format!(
                    "no handler registered for command type {}",
                    command.command_type
                ))
            })?;

        if let Some(expected) = command.expected_version {
            let aggregate_id = command.aggregate_id.ok_or_else(|| {
                DomainError::invalid("expected_version", "requires aggregate_id")
            })?;
            let actual = self.store.get_aggregate_version(aggregate_id).await?;
            if actual != expected {
                warn!(%aggregate_id, expected, actual, "expected version mismatch");
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id,
                    expected,
                    actual,
                });
            }
        }

        let ctx = HandlerContext {
            store: self.store.as_ref(),
            clock: self.clock.as_ref(),
        };
        let mut drafts = handler.handle(&command, &ctx).await?;
        if let Some(first) = drafts.first_mut() {
            first.idempotency_key.clone_from(&command.idempotency_key);
        }

        let outcome = self.store.append_events(drafts).await?;
        if outcome.replayed {
            ensure_key_owner(&outcome.events, command.tenant_id())?;
            warn!("lost idempotency race, returning the winner's result");
            let command_id = outcome
                .events
                .first()
                .map_or(command.command_id, |e| e.metadata.causation_id);
            return CommandResult::from_events(command_id, outcome.events, self.clock.now(), true);
        }

        let result =
            CommandResult::from_events(command.command_id, outcome.events, self.clock.now(), false)?;
        info!(
            aggregate_id = %result.aggregate_id,
            aggregate_version = result.aggregate_version,
            events = result.events.len(),
            "command accepted"
        );
        Ok(result)
    }

    async fn replay(&self, key: &str, tenant_id: Uuid) -> Result<Option<CommandResult>, DomainError> {
        let original = match self.store.get_event_by_idempotency_key(key).await {
            Ok(event) => event,
            Err(DomainError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e),
        };
        ensure_key_owner(std::slice::from_ref(&original), tenant_id)?;
        let causation_id = original.metadata.causation_id;
        let events = self.store.get_events_by_causation(causation_id).await?;
        warn!(idempotency_key = key, %causation_id, "idempotent replay");
        CommandResult::from_events(causation_id, events, self.clock.now(), true).map(Some)
    }
}

/// Idempotency keys are global in the log; a key recorded by one tenant is
/// never replayed to another.
fn ensure_key_owner(events: &[Event], tenant_id: Uuid) -> Result<(), DomainError> {
    if events.iter().any(|e| e.tenant_id != tenant_id) {
        warn!(%tenant_id, "idempotency key belongs to another tenant");
        return Err(DomainError::invalid(
            "idempotency_key",
            "already used by another tenant",
        ));
    }
    Ok(())
}
