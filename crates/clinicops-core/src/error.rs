//! Domain error types.

use std::fmt;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An aggregate has no events.
    #[error("aggregate not found: {0}")]
    AggregateNotFound(Uuid),

    /// A referenced entity (idempotency key, read-model row, ...) is absent.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of entity that was looked up.
        entity: &'static str,
        /// The key used for the lookup.
        key: String,
    },

    /// Optimistic concurrency conflict.
    #[error("concurrency conflict on aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        /// The aggregate that had the conflict.
        aggregate_id: Uuid,
        /// The expected version.
        expected: i64,
        /// The actual version found.
        actual: i64,
    },

    /// One or more payload or business-rule violations.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Missing or duplicate handler registration. A programming defect, not a
    /// user error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Shorthand for a validation error with a single violation.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut errors = ValidationErrors::new();
        errors.push(field, reason);
        Self::Validation(errors)
    }

    /// Shorthand for `DomainError::NotFound`.
    #[must_use]
    pub fn not_found(entity: &'static str, key: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }
}

/// A single violated field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Payload field (dotted path for nested fields).
    pub field: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Every violation found while validating one payload.
///
/// Handlers collect into this instead of returning on the first failure so
/// callers see the full list in one response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a violation.
    pub fn push(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            reason: reason.into(),
        });
    }

    /// Records a violation when `ok` is false.
    pub fn check(&mut self, ok: bool, field: &str, reason: &str) {
        if !ok {
            self.push(field, reason);
        }
    }

    /// Records a violation when a required string is blank.
    pub fn require_text(&mut self, value: &str, field: &str) {
        self.check(!value.trim().is_empty(), field, "must not be blank");
    }

    /// Returns `true` if no violation was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The recorded violations.
    #[must_use]
    pub fn errors(&self) -> &[FieldError] {
        &self.0
    }

    /// Converts the collection into a result.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if any violation was recorded.
    pub fn into_result(self) -> Result<(), DomainError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|e| format!("{}: {}", e.field, e.reason))
            .collect();
        f.write_str(&parts.join("; "))
    }
}
