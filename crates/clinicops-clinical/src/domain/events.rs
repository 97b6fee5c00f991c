//! Domain events for the Patients & Visits context.

use chrono::{DateTime, NaiveDate, Utc};
use clinicops_core::event::{AggregateType, DomainEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type identifier for [`PatientRegistered`].
pub const PATIENT_REGISTERED_EVENT_TYPE: &str = "patient_registered";
/// Event type identifier for [`PatientUpdated`].
pub const PATIENT_UPDATED_EVENT_TYPE: &str = "patient_updated";
/// Event type identifier for [`VisitScheduled`].
pub const VISIT_SCHEDULED_EVENT_TYPE: &str = "visit_scheduled";
/// Event type identifier for [`VisitCompleted`].
pub const VISIT_COMPLETED_EVENT_TYPE: &str = "visit_completed";
/// Event type identifier for [`VisitCancelled`].
pub const VISIT_CANCELLED_EVENT_TYPE: &str = "visit_cancelled";

/// Emitted when a patient is registered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRegistered {
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
}

/// Emitted when demographics change. Only the changed fields are present.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PatientUpdated {
    /// The patient identifier.
    pub patient_id: Uuid,
    /// New given name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    /// New family name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    /// New phone.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// New email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// New address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Event payload variants for the patient stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum PatientEvent {
    /// A patient has been registered.
    PatientRegistered(PatientRegistered),
    /// A patient's demographics have changed.
    PatientUpdated(PatientUpdated),
}

impl DomainEvent for PatientEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::Patient;

    fn event_type(&self) -> &'static str {
        match self {
            Self::PatientRegistered(_) => PATIENT_REGISTERED_EVENT_TYPE,
            Self::PatientUpdated(_) => PATIENT_UPDATED_EVENT_TYPE,
        }
    }
}

/// Emitted when a visit is scheduled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitScheduled {
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
}

/// Emitted when a visit is completed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitCompleted {
    /// The visit identifier.
    pub visit_id: Uuid,
    /// Clinical diagnosis.
    pub diagnosis: String,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
}

/// Emitted when a visit is cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitCancelled {
    /// The visit identifier.
    pub visit_id: Uuid,
    /// Cancellation reason.
    pub reason: String,
    /// Cancellation time.
    pub cancelled_at: DateTime<Utc>,
}

/// Event payload variants for the visit stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum VisitEvent {
    /// A visit has been scheduled.
    VisitScheduled(VisitScheduled),
    /// A visit has been completed.
    VisitCompleted(VisitCompleted),
    /// A visit has been cancelled.
    VisitCancelled(VisitCancelled),
}

impl DomainEvent for VisitEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::Visit;

    fn event_type(&self) -> &'static str {
        match self {
            Self::VisitScheduled(_) => VISIT_SCHEDULED_EVENT_TYPE,
            Self::VisitCompleted(_) => VISIT_COMPLETED_EVENT_TYPE,
            Self::VisitCancelled(_) => VISIT_CANCELLED_EVENT_TYPE,
        }
    }
}
