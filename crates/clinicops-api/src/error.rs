//! ClinicOps: API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use clinicops_core::error::DomainError;
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Startup and runtime errors for the API server.
#[derive(Debug, Error)]
pub enum AppError {
    /// A required environment variable is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// Database connection or pool error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Tracing or span exporter setup failed.
    #[error("telemetry error: {0}")]
    Telemetry(String),

    /// Wiring the command bus failed.
    #[error("startup error: {0}")]
    Domain(#[from] DomainError),

    /// Network binding or I/O error.
    #[error("server error: {0}")]
    Server(#[from] std::io::Error),
}

/// JSON body returned for error responses.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code.
    pub error: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// Structured context: field errors or conflicting versions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// HTTP-layer wrapper around `DomainError` that implements `IntoResponse`.
#[derive(Debug)]
pub struct ApiError(pub DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self.0 {
            DomainError::AggregateNotFound(_) => {
                (StatusCode::NOT_FOUND, "aggregate_not_found", None)
            }
            DomainError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found", None),
            DomainError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => (
                StatusCode::CONFLICT,
                "concurrency_conflict",
                Some(json!({
                    "aggregate_id": aggregate_id,
                    "expected_version": expected,
                    "actual_version": actual,
                })),
            ),
            DomainError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                Some(json!({ "errors": errors.errors() })),
            ),
            DomainError::Configuration(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error", None)
            }
            DomainError::Infrastructure(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "infrastructure_error", None)
            }
        };

        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = ErrorBody {
            error: error_code,
            message: self.0.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use uuid::Uuid;

    fn status_of(err: DomainError) -> StatusCode {
        let response = ApiError(err).into_response();
        response.status()
    }

    #[test]
    fn test_aggregate_not_found_maps_to_404() {
        let id = Uuid::new_v4();
        assert_eq!(
            status_of(DomainError::AggregateNotFound(id)),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_missing_entity_maps_to_404() {
        assert_eq!(
            status_of(DomainError::not_found("read model", "bogus")),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_concurrency_conflict_maps_to_409() {
        assert_eq!(
            status_of(DomainError::ConcurrencyConflict {
                aggregate_id: Uuid::new_v4(),
                expected: 1,
                actual: 2,
            }),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn test_validation_maps_to_422() {
        assert_eq!(
            status_of(DomainError::invalid("mrn", "must match MRN-YYYY-NNNNNN")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn test_configuration_maps_to_500() {
        assert_eq!(
            status_of(DomainError::Configuration("no handler registered for x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_infrastructure_maps_to_500() {
        assert_eq!(
            status_of(DomainError::Infrastructure("db down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
