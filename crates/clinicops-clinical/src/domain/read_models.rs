//! Read-model row shapes for the `patients` and `visits` tables.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregates::VisitStatus;

/// A row of the `patients` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRow {
    /// The patient identifier.
    pub patient_id: Uuid,
    /// Medical record number.
    pub mrn: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Date of birth.
    pub date_of_birth: NaiveDate,
    /// Recorded sex.
    pub sex: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Postal address.
    pub address: Option<String>,
    /// Registration time.
    pub registered_at: DateTime<Utc>,
}

/// A row of the `visits` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitRow {
    /// The visit identifier.
    pub visit_id: Uuid,
    /// The patient being seen.
    pub patient_id: Uuid,
    /// Attending doctor.
    pub doctor_id: Option<Uuid>,
    /// Planned start.
    pub scheduled_at: DateTime<Utc>,
    /// Reason for the visit.
    pub reason: String,
    /// Lifecycle state.
    pub status: VisitStatus,
    /// Diagnosis, once completed.
    #[serde(default)]
    pub diagnosis: Option<String>,
    /// Clinical notes, once completed.
    #[serde(default)]
    pub notes: Option<String>,
    /// Completion time.
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Cancellation reason.
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    /// Cancellation time.
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
}
