//! Read-model row shapes owned by the Scheduling context.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregates::{AppointmentStatus, DoctorStatus, LeaveStatus, SlotStatus};
use super::slot_planning::{ConsultationMode, DayOfWeek, HoldType, ScheduleSource, SlotWindow};

/// Open/closed state shared by records that are simply active until closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Active,
    Inactive,
    Cancelled,
    Resolved,
    Lifted,
}

/// A row of the `doctor_profiles` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorProfileRow {
    pub doctor_id: Uuid,
    pub hospital_id: Uuid,
    pub full_name: String,
    pub specialty: String,
    #[serde(default)]
    pub license_number: Option<String>,
    pub status: DoctorStatus,
    pub is_bookable: bool,
    pub is_visible: bool,
    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,
}

/// A row of the `doctor_schedules` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorScheduleRow {
    pub schedule_id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    #[serde(flatten)]
    pub window: SlotWindow,
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub effective_until: Option<NaiveDate>,
    pub status: RecordStatus,
}

/// A row of the `schedule_overrides` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOverrideRow {
    pub override_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub is_available: bool,
    #[serde(default)]
    pub window: Option<SlotWindow>,
    #[serde(default)]
    pub reason: Option<String>,
    pub status: RecordStatus,
}

/// A row of the `leave_requests` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequestRow {
    pub leave_id: Uuid,
    pub doctor_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: String,
    pub reason: String,
    pub status: LeaveStatus,
    #[serde(default)]
    pub reviewed_by: Option<Uuid>,
    #[serde(default)]
    pub review_note: Option<String>,
    #[serde(default)]
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// A row of the `holidays` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayRow {
    pub holiday_id: Uuid,
    pub hospital_id: Uuid,
    pub date: NaiveDate,
    pub name: String,
    pub status: RecordStatus,
}

/// A row of the `emergency_unavailability` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyUnavailabilityRow {
    pub emergency_id: Uuid,
    pub doctor_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub status: RecordStatus,
}

/// A row of the `forced_blocks` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcedBlockRow {
    pub block_id: Uuid,
    #[serde(default)]
    pub hospital_id: Option<Uuid>,
    #[serde(default)]
    pub doctor_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
    pub status: RecordStatus,
}

/// A row of the `appointment_slots` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentSlotRow {
    pub slot_id: Uuid,
    pub generation_run_id: Uuid,
    pub doctor_id: Uuid,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: u32,
    pub consultation_mode: ConsultationMode,
    pub max_capacity: u32,
    pub current_bookings: u32,
    pub in_person_bookings: u32,
    pub virtual_bookings: u32,
    pub status: SlotStatus,
    pub schedule_source: ScheduleSource,
}

/// Lifecycle of a tentative hold row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldStatus {
    Active,
    Released,
    Expired,
}

/// A row of the `tentative_holds` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TentativeHoldRow {
    pub hold_id: Uuid,
    pub slot_id: Uuid,
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    pub holder_id: Uuid,
    pub hold_type: HoldType,
    pub placed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: HoldStatus,
    #[serde(default)]
    pub release_reason: Option<String>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl TentativeHoldRow {
    /// Returns `true` while the hold still excludes others.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == HoldStatus::Active && self.expires_at > now
    }
}

/// A row of the `appointments` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentRow {
    pub appointment_id: Uuid,
    pub slot_id: Uuid,
    pub generation_run_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub consultation_mode: ConsultationMode,
    #[serde(default)]
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub booked_at: DateTime<Utc>,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub cancelled_at: Option<DateTime<Utc>>,
}
