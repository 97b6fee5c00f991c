//! Command payloads for the Patients & Visits context.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

/// Command type for [`RegisterPatient`].
pub const REGISTER_PATIENT: &str = "register_patient";
/// Command type for [`UpdatePatient`].
pub const UPDATE_PATIENT: &str = "update_patient";
/// Command type for [`ScheduleVisit`].
pub const SCHEDULE_VISIT: &str = "schedule_visit";
/// Command type for [`CompleteVisit`].
pub const COMPLETE_VISIT: &str = "complete_visit";
/// Command type for [`CancelVisit`].
pub const CANCEL_VISIT: &str = "cancel_visit";

/// Registers a new patient.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPatient {
    /// Client-chosen identifier; generated when absent.
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    /// Medical record number, `MRN-YYYY-NNNNNN`.
    pub mrn: String,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
    /// Date of birth.
    pub date_of_birth: NaiveDate,
    /// Recorded sex.
    #[serde(default)]
    pub sex: Option<String>,
    /// Contact phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Postal address.
    #[serde(default)]
    pub address: Option<String>,
}

/// Changes a patient's demographics. Absent fields stay as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdatePatient {
    /// Given name.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Family name.
    #[serde(default)]
    pub last_name: Option<String>,
    /// Contact phone.
    #[serde(default)]
    pub phone: Option<String>,
    /// Contact email.
    #[serde(default)]
    pub email: Option<String>,
    /// Postal address.
    #[serde(default)]
    pub address: Option<String>,
}

/// Schedules a visit for an existing patient.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleVisit {
    /// Client-chosen identifier; generated when absent.
    #[serde(default)]
    pub visit_id: Option<Uuid>,
    /// The patient being seen.
    pub patient_id: Uuid,
    /// Attending doctor.
    #[serde(default)]
    pub doctor_id: Option<Uuid>,
    /// Planned start.
    pub scheduled_at: DateTime<Utc>,
    /// Reason for the visit.
    pub reason: String,
}

/// Completes a scheduled visit.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteVisit {
    /// Clinical diagnosis.
    pub diagnosis: String,
    /// Free-form notes.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Cancels a scheduled visit.
#[derive(Debug, Clone, Deserialize)]
pub struct CancelVisit {
    /// Why the visit was cancelled.
    pub reason: String,
}
