//! Command abstractions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DomainError;
use crate::event::{AggregateType, ClientInfo, DomainEvent, Event, EventDraft, EventMetadata};
use crate::store::EventStore;

/// Tenant, actor and client context of a command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMetadata {
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// The acting user, if any.
    #[serde(default)]
    pub actor_id: Option<Uuid>,
    /// Caller-supplied correlation ID; defaults to the command ID.
    #[serde(default)]
    pub correlation_id: Option<Uuid>,
    /// Client context.
    #[serde(default)]
    pub client: Option<ClientInfo>,
    /// Forward-compatible extension values.
    #[serde(default)]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

impl CommandMetadata {
    /// Metadata for a user-less tenant command.
    #[must_use]
    pub fn for_tenant(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            actor_id: None,
            correlation_id: None,
            client: None,
            extensions: serde_json::Map::new(),
        }
    }

    /// Metadata for commands issued by background services.
    #[must_use]
    pub fn system(tenant_id: Uuid) -> Self {
        let mut metadata = Self::for_tenant(tenant_id);
        metadata
            .extensions
            .insert("source".into(), serde_json::Value::String("system".into()));
        metadata
    }
}

/// A transient request to change state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    /// Unique command identifier; becomes the causation ID of its events.
    pub command_id: Uuid,
    /// Routing key for handler lookup.
    pub command_type: String,
    /// Target aggregate, if the command mutates an existing one.
    pub aggregate_id: Option<Uuid>,
    /// Optimistic concurrency guard.
    pub expected_version: Option<i64>,
    /// Caller-supplied dedup token.
    pub idempotency_key: Option<String>,
    /// Command-specific payload.
    pub payload: serde_json::Value,
    /// Tenant, actor and client context.
    pub metadata: CommandMetadata,
}

impl Command {
    /// Creates a command with a fresh ID.
    #[must_use]
    pub fn new(
        command_type: impl Into<String>,
        metadata: CommandMetadata,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            command_id: Uuid::new_v4(),
            command_type: command_type.into(),
            aggregate_id: None,
            expected_version: None,
            idempotency_key: None,
            payload,
            metadata,
        }
    }

    /// Targets an existing aggregate.
    #[must_use]
    pub fn for_aggregate(mut self, aggregate_id: Uuid) -> Self {
        self.aggregate_id = Some(aggregate_id);
        self
    }

    /// Sets the expected aggregate version.
    #[must_use]
    pub fn expecting_version(mut self, version: i64) -> Self {
        self.expected_version = Some(version);
        self
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Returns the owning tenant.
    #[must_use]
    pub fn tenant_id(&self) -> Uuid {
        self.metadata.tenant_id
    }

    /// Returns the target aggregate.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the command has no target.
    pub fn require_aggregate_id(&self) -> Result<Uuid, DomainError> {
        self.aggregate_id
            .ok_or_else(|| DomainError::invalid("aggregate_id", "is required for this command"))
    }

    /// Deserializes the payload.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` naming the payload if its shape does
    /// not match `T`.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, DomainError> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| DomainError::invalid("payload", e.to_string()))
    }

    /// Event metadata derived from this command.
    #[must_use]
    pub fn event_metadata(&self) -> EventMetadata {
        EventMetadata {
            correlation_id: self.metadata.correlation_id.unwrap_or(self.command_id),
            causation_id: self.command_id,
            actor_id: self.metadata.actor_id,
            client: self.metadata.client.clone(),
            extensions: self.metadata.extensions.clone(),
        }
    }

    /// Builds a draft for `event` at `version` on `aggregate_id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the event cannot be
    /// serialized.
    pub fn draft<E: DomainEvent>(
        &self,
        aggregate_id: Uuid,
        version: i64,
        event: &E,
    ) -> Result<EventDraft, DomainError> {
        let (event_type, payload) = event.encode()?;
        Ok(EventDraft {
            aggregate_type: E::AGGREGATE_TYPE,
            aggregate_id,
            aggregate_version: version,
            event_type,
            schema_version: event.schema_version(),
            payload,
            metadata: self.event_metadata(),
            tenant_id: self.tenant_id(),
            idempotency_key: None,
        })
    }
}

/// The only steady-state outcome; failures are errors, not statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// The command's events are in the log.
    Accepted,
}

/// Result of a successfully handled command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandResult {
    /// The command that produced the events.
    pub command_id: Uuid,
    /// The primary aggregate affected or created by the command.
    pub aggregate_id: Uuid,
    /// Type of the primary aggregate.
    pub aggregate_type: AggregateType,
    /// Version of the primary aggregate after the command.
    pub aggregate_version: i64,
    /// The persisted events.
    pub events: Vec<Event>,
    /// Always `Accepted`.
    pub status: CommandStatus,
    /// When the command was processed.
    pub processed_at: DateTime<Utc>,
    /// `true` if returned from an idempotent replay.
    pub replayed: bool,
}

impl CommandResult {
    /// Builds a result from persisted events; the first event names the
    /// primary aggregate.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if `events` is empty.
    pub fn from_events(
        command_id: Uuid,
        events: Vec<Event>,
        processed_at: DateTime<Utc>,
        replayed: bool,
    ) -> Result<Self, DomainError> {
        let primary = events
            .first()
            .ok_or_else(|| DomainError::Infrastructure("command produced no events".into()))?;
        let aggregate_id = primary.aggregate_id;
        let aggregate_type = primary.aggregate_type;
        let aggregate_version = events
            .iter()
            .filter(|e| e.aggregate_id == aggregate_id)
            .map(|e| e.aggregate_version)
            .max()
            .unwrap_or(primary.aggregate_version);
        Ok(Self {
            command_id,
            aggregate_id,
            aggregate_type,
            aggregate_version,
            events,
            status: CommandStatus::Accepted,
            processed_at,
            replayed,
        })
    }
}

/// What a handler may touch while deciding.
pub struct HandlerContext<'a> {
    /// Read access to the log (handlers return drafts instead of appending).
    pub store: &'a dyn EventStore,
    /// Time source for TTLs and "future" checks.
    pub clock: &'a dyn Clock,
}

impl HandlerContext<'_> {
    /// Current version of an aggregate that must already exist.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if the aggregate has no
    /// events.
    pub async fn existing_version(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        let version = self.store.get_aggregate_version(aggregate_id).await?;
        if version == 0 {
            return Err(DomainError::AggregateNotFound(aggregate_id));
        }
        Ok(version)
    }

    /// Returns `true` if `aggregate_id` is a `aggregate_type` stream owned by
    /// `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the store fails.
    pub async fn aggregate_exists(
        &self,
        tenant_id: Uuid,
        aggregate_id: Uuid,
        aggregate_type: AggregateType,
    ) -> Result<bool, DomainError> {
        let events = self.store.get_aggregate_events(aggregate_id, 0).await?;
        Ok(events
            .first()
            .is_some_and(|e| e.tenant_id == tenant_id && e.aggregate_type == aggregate_type))
    }

    /// Ensures a client-chosen ID for a new aggregate is unused.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if the aggregate exists.
    pub async fn ensure_new(&self, aggregate_id: Uuid) -> Result<(), DomainError> {
        let actual = self.store.get_aggregate_version(aggregate_id).await?;
        if actual != 0 {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: 0,
                actual,
            });
        }
        Ok(())
    }
}

/// One handler per command type.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The command type this handler is registered under.
    fn command_type(&self) -> &'static str;

    /// Validates the command and returns the drafts to append.
    ///
    /// # Errors
    ///
    /// Returns `DomainError` on validation, lookup or concurrency failures.
    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError>;
}
