//! The generic command endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::{Json, Router, routing::post};
use chrono::{DateTime, Utc};
use clinicops_core::command::{Command, CommandResult, CommandStatus};
use clinicops_core::event::AggregateType;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use super::metadata::RequestMetadata;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /commands.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Registered command type, e.g. `register_patient`.
    pub command_type: String,
    /// Command-specific fields.
    #[serde(default = "empty_payload")]
    pub payload: serde_json::Value,
    /// Target aggregate for commands on existing aggregates.
    #[serde(default)]
    pub aggregate_id: Option<Uuid>,
    /// Version the caller last saw.
    #[serde(default)]
    pub expected_version: Option<i64>,
    /// Deduplication key.
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

fn empty_payload() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// One persisted event, as reported back to the caller.
#[derive(Debug, Serialize)]
pub struct EventSummary {
    pub event_id: Uuid,
    pub sequence: i64,
    pub event_type: String,
    pub aggregate_id: Uuid,
    pub aggregate_version: i64,
}

/// Response body for an accepted (or replayed) command.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub command_id: Uuid,
    pub status: CommandStatus,
    pub aggregate_id: Uuid,
    pub aggregate_type: AggregateType,
    pub aggregate_version: i64,
    pub events: Vec<EventSummary>,
    pub processed_at: DateTime<Utc>,
    pub replayed: bool,
}

impl From<CommandResult> for CommandResponse {
    fn from(result: CommandResult) -> Self {
        Self {
            command_id: result.command_id,
            status: result.status,
            aggregate_id: result.aggregate_id,
            aggregate_type: result.aggregate_type,
            aggregate_version: result.aggregate_version,
            events: result
                .events
                .into_iter()
                .map(|e| EventSummary {
                    event_id: e.event_id,
                    sequence: e.sequence,
                    event_type: e.event_type,
                    aggregate_id: e.aggregate_id,
                    aggregate_version: e.aggregate_version,
                })
                .collect(),
            processed_at: result.processed_at,
            replayed: result.replayed,
        }
    }
}

/// POST /commands
///
/// 202 when new events were appended, 200 for an idempotent replay.
#[instrument(
    skip(state, metadata, request),
    fields(command_type = %request.command_type, tenant_id = %metadata.tenant_id())
)]
async fn submit_command(
    State(state): State<AppState>,
    metadata: RequestMetadata,
    Json(request): Json<CommandRequest>,
) -> Result<(StatusCode, Json<CommandResponse>), ApiError> {
    let mut command = Command::new(request.command_type, metadata.0, request.payload);
    if let Some(aggregate_id) = request.aggregate_id {
        command = command.for_aggregate(aggregate_id);
    }
    if let Some(version) = request.expected_version {
        command = command.expecting_version(version);
    }
    if let Some(key) = request.idempotency_key {
        command = command.with_idempotency_key(key);
    }

    let result = state.bus.handle(command).await?;
    let status = if result.replayed {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    info!(
        command_id = %result.command_id,
        aggregate_id = %result.aggregate_id,
        version = result.aggregate_version,
        replayed = result.replayed,
        "command handled"
    );
    Ok((status, Json(result.into())))
}

/// Returns the router for the command endpoint.
pub fn router() -> Router<AppState> {
    Router::new().route("/commands", post(submit_command))
}
