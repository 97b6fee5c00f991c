//! Tenant-scoped access to the projected tables and projection health.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use clinicops_core::error::DomainError;
use clinicops_core::read_model::{ReadModelRow, ReadModelTable, RowFilter};
use clinicops_core::store::{ProjectionCheckpoint, ProjectionErrorRecord};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::metadata::RequestMetadata;
use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

/// Paging query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }

    fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

/// Response body for GET /read-models/{table}.
#[derive(Debug, Serialize)]
pub struct RowsResponse {
    pub table: ReadModelTable,
    pub rows: Vec<ReadModelRow>,
}

/// GET /read-models/{table}
async fn list_rows(
    State(state): State<AppState>,
    metadata: RequestMetadata,
    Path(table): Path<String>,
    Query(page): Query<PageQuery>,
) -> Result<Json<RowsResponse>, ApiError> {
    let table: ReadModelTable = table.parse()?;
    let filter = RowFilter::for_tenant(metadata.tenant_id()).page(page.limit(), page.offset());
    let rows = state.read_models.find(table, &filter).await?;
    Ok(Json(RowsResponse { table, rows }))
}

/// GET /read-models/{table}/{id}
async fn get_row(
    State(state): State<AppState>,
    metadata: RequestMetadata,
    Path((table, id)): Path<(String, Uuid)>,
) -> Result<Json<ReadModelRow>, ApiError> {
    let table: ReadModelTable = table.parse()?;
    let row = state
        .read_models
        .get(table, id)
        .await?
        .filter(|row| row.tenant_id == metadata.tenant_id())
        .ok_or_else(|| DomainError::not_found(table.as_str(), id))?;
    Ok(Json(row))
}

/// GET /projections/errors
async fn list_projection_errors(
    State(state): State<AppState>,
    Query(page): Query<PageQuery>,
) -> Result<Json<Vec<ProjectionErrorRecord>>, ApiError> {
    let errors = state.store.list_projection_errors(page.limit()).await?;
    Ok(Json(errors))
}

/// GET /projections/{name}/checkpoint
async fn get_checkpoint(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ProjectionCheckpoint>, ApiError> {
    let checkpoint = state.store.get_projection_checkpoint(&name).await?;
    Ok(Json(checkpoint))
}

/// Returns the router for read-side endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/read-models/{table}", get(list_rows))
        .route("/read-models/{table}/{id}", get(get_row))
        .route("/projections/errors", get(list_projection_errors))
        .route("/projections/{name}/checkpoint", get(get_checkpoint))
}
