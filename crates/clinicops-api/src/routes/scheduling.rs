//! Routes for slot generation and holds.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::NaiveDate;
use clinicops_scheduling::application::holds::HoldRequest;
use clinicops_scheduling::application::slot_generation::RegenerationOutcome;
use clinicops_scheduling::domain::slot_planning::HoldType;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use super::commands::CommandResponse;
use super::metadata::RequestMetadata;
use crate::error::ApiError;
use crate::state::AppState;

/// Request body for slot generation and regeneration.
#[derive(Debug, Deserialize)]
pub struct DateRangeRequest {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

/// Response body for POST .../slots/generate.
#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub doctor_id: Uuid,
    pub generated: usize,
}

/// Response body for GET /slots/{slot_id}/availability.
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub slot_id: Uuid,
    pub available: bool,
}

/// Request body for POST /slots/{slot_id}/holds.
#[derive(Debug, Deserialize)]
pub struct PlaceHoldRequest {
    pub holder_id: Uuid,
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    pub hold_type: HoldType,
    #[serde(default)]
    pub ttl_minutes: Option<u32>,
}

/// Response body for POST /slots/{slot_id}/holds.
#[derive(Debug, Serialize)]
pub struct HoldResponse {
    pub hold_id: Uuid,
    #[serde(flatten)]
    pub command: CommandResponse,
}

/// Request body for POST /slots/{slot_id}/holds/{hold_id}/release.
#[derive(Debug, Default, Deserialize)]
pub struct ReleaseHoldRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// POST /doctors/{doctor_id}/slots/generate
#[instrument(skip(state, metadata, range))]
async fn generate_slots(
    State(state): State<AppState>,
    metadata: RequestMetadata,
    Path(doctor_id): Path<Uuid>,
    Json(range): Json<DateRangeRequest>,
) -> Result<Json<GenerationResponse>, ApiError> {
    let generated = state
        .slots
        .generate_slots_for_doctor(metadata.tenant_id(), doctor_id, range.from_date, range.to_date)
        .await?;
    Ok(Json(GenerationResponse {
        doctor_id,
        generated,
    }))
}

/// POST /doctors/{doctor_id}/slots/regenerate
#[instrument(skip(state, metadata, range))]
async fn regenerate_slots(
    State(state): State<AppState>,
    metadata: RequestMetadata,
    Path(doctor_id): Path<Uuid>,
    Json(range): Json<DateRangeRequest>,
) -> Result<Json<RegenerationOutcome>, ApiError> {
    let outcome = state
        .slots
        .regenerate_slots_for_doctor(metadata.tenant_id(), doctor_id, range.from_date, range.to_date)
        .await?;
    Ok(Json(outcome))
}

/// GET /slots/{slot_id}/availability
async fn slot_availability(
    State(state): State<AppState>,
    metadata: RequestMetadata,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let available = state
        .holds
        .is_slot_available(metadata.tenant_id(), slot_id)
        .await?;
    Ok(Json(AvailabilityResponse { slot_id, available }))
}

/// POST /slots/{slot_id}/holds
#[instrument(skip(state, metadata, request))]
async fn place_hold(
    State(state): State<AppState>,
    metadata: RequestMetadata,
    Path(slot_id): Path<Uuid>,
    Json(request): Json<PlaceHoldRequest>,
) -> Result<(StatusCode, Json<HoldResponse>), ApiError> {
    let tenant_id = metadata.tenant_id();
    let placement = state
        .holds
        .place_hold(
            tenant_id,
            slot_id,
            HoldRequest {
                holder_id: request.holder_id,
                patient_id: request.patient_id,
                hold_type: request.hold_type,
                ttl_minutes: request.ttl_minutes,
            },
            metadata.0,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(HoldResponse {
            hold_id: placement.hold_id,
            command: placement.result.into(),
        }),
    ))
}

/// POST /slots/{slot_id}/holds/{hold_id}/release
#[instrument(skip(state, metadata, request))]
async fn release_hold(
    State(state): State<AppState>,
    metadata: RequestMetadata,
    Path((slot_id, hold_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<ReleaseHoldRequest>,
) -> Result<Json<CommandResponse>, ApiError> {
    let tenant_id = metadata.tenant_id();
    let result = state
        .holds
        .release_hold(tenant_id, slot_id, hold_id, request.reason, metadata.0)
        .await?;
    Ok(Json(result.into()))
}

/// Returns the router for the scheduling surface.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/doctors/{doctor_id}/slots/generate", post(generate_slots))
        .route("/doctors/{doctor_id}/slots/regenerate", post(regenerate_slots))
        .route("/slots/{slot_id}/availability", get(slot_availability))
        .route("/slots/{slot_id}/holds", post(place_hold))
        .route("/slots/{slot_id}/holds/{hold_id}/release", post(release_hold))
}
