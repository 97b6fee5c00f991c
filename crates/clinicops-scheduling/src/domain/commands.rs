//! Command types and payloads for the Scheduling context.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::GeneratedSlot;
use super::slot_planning::{ConsultationMode, DayOfWeek, HoldType, SlotWindow};

pub const CREATE_DOCTOR_PROFILE: &str = "create_doctor_profile";
pub const ACTIVATE_DOCTOR_PROFILE: &str = "activate_doctor_profile";
pub const UPDATE_DOCTOR_PROFILE: &str = "update_doctor_profile";
pub const CREATE_DOCTOR_SCHEDULE: &str = "create_doctor_schedule";
pub const UPDATE_DOCTOR_SCHEDULE: &str = "update_doctor_schedule";
pub const DEACTIVATE_DOCTOR_SCHEDULE: &str = "deactivate_doctor_schedule";
pub const CREATE_SCHEDULE_OVERRIDE: &str = "create_schedule_override";
pub const CANCEL_SCHEDULE_OVERRIDE: &str = "cancel_schedule_override";
pub const SUBMIT_LEAVE_REQUEST: &str = "submit_leave_request";
pub const APPROVE_LEAVE_REQUEST: &str = "approve_leave_request";
pub const REJECT_LEAVE_REQUEST: &str = "reject_leave_request";
pub const DECLARE_HOLIDAY: &str = "declare_holiday";
pub const CANCEL_HOLIDAY: &str = "cancel_holiday";
pub const DECLARE_EMERGENCY_UNAVAILABILITY: &str = "declare_emergency_unavailability";
pub const RESOLVE_EMERGENCY_UNAVAILABILITY: &str = "resolve_emergency_unavailability";
pub const CREATE_FORCED_BLOCK: &str = "create_forced_block";
pub const LIFT_FORCED_BLOCK: &str = "lift_forced_block";
pub const GENERATE_SLOTS: &str = "generate_slots";
pub const REGENERATE_SLOTS: &str = "regenerate_slots";
pub const PLACE_HOLD: &str = "place_hold";
pub const RELEASE_HOLD: &str = "release_hold";
pub const EXPIRE_HOLD: &str = "expire_hold";
pub const BLOCK_SLOT: &str = "block_slot";
pub const UNBLOCK_SLOT: &str = "unblock_slot";
pub const BOOK_APPOINTMENT: &str = "book_appointment";
pub const CANCEL_APPOINTMENT: &str = "cancel_appointment";

/// Payload of `create_doctor_profile`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDoctorProfile {
    #[serde(default)]
    pub doctor_id: Option<Uuid>,
    /// Hospital the doctor practises at.
    pub hospital_id: Uuid,
    pub full_name: String,
    pub specialty: String,
    #[serde(default)]
    pub license_number: Option<String>,
}

/// Payload of `update_doctor_profile`. At least one field must be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDoctorProfile {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
    #[serde(default)]
    pub license_number: Option<String>,
    /// Whether patients may book the doctor (requires an active profile).
    #[serde(default)]
    pub is_bookable: Option<bool>,
    /// Whether the doctor appears in directories.
    #[serde(default)]
    pub is_visible: Option<bool>,
}

/// Payload of `create_doctor_schedule`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateDoctorSchedule {
    #[serde(default)]
    pub schedule_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    #[serde(flatten)]
    pub window: SlotWindow,
    pub effective_from: NaiveDate,
    #[serde(default)]
    pub effective_until: Option<NaiveDate>,
}

/// Payload of `update_doctor_schedule`; absent fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateDoctorSchedule {
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    #[serde(default)]
    pub slot_duration_minutes: Option<u32>,
    #[serde(default)]
    pub buffer_minutes: Option<u32>,
    #[serde(default)]
    pub consultation_mode: Option<ConsultationMode>,
    #[serde(default)]
    pub max_capacity: Option<u32>,
    #[serde(default)]
    pub effective_until: Option<NaiveDate>,
}

/// Payload of `create_schedule_override`. Without a window the doctor is
/// unavailable on `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateScheduleOverride {
    #[serde(default)]
    pub override_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub is_available: bool,
    #[serde(default)]
    pub window: Option<SlotWindow>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Payload of `submit_leave_request`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitLeaveRequest {
    #[serde(default)]
    pub leave_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: String,
    pub reason: String,
}

/// Payload of `approve_leave_request` and `reject_leave_request`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewLeaveRequest {
    #[serde(default)]
    pub note: Option<String>,
}

/// Payload of `declare_holiday`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclareHoliday {
    #[serde(default)]
    pub holiday_id: Option<Uuid>,
    pub hospital_id: Uuid,
    pub date: NaiveDate,
    pub name: String,
}

/// Payload of `declare_emergency_unavailability`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclareEmergencyUnavailability {
    #[serde(default)]
    pub emergency_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

/// Payload of `create_forced_block`. Exactly one scope must be given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateForcedBlock {
    #[serde(default)]
    pub block_id: Option<Uuid>,
    #[serde(default)]
    pub hospital_id: Option<Uuid>,
    #[serde(default)]
    pub doctor_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

/// Payload of the cancel/resolve/lift/deactivate family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WithReason {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Payload of `generate_slots`, produced by the slot generation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateSlots {
    #[serde(default)]
    pub run_id: Option<Uuid>,
    pub doctor_id: Uuid,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub slots: Vec<GeneratedSlot>,
}

/// A slot to withdraw during regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWithdrawal {
    pub slot_id: Uuid,
    pub generation_run_id: Uuid,
    /// Slot stream version the engine observed.
    pub expected_version: i64,
}

/// Payload of `regenerate_slots`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegenerateSlots {
    #[serde(flatten)]
    pub generate: GenerateSlots,
    #[serde(default)]
    pub withdrawals: Vec<SlotWithdrawal>,
}

/// Payload of `place_hold`; the command targets the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceHold {
    #[serde(default)]
    pub hold_id: Option<Uuid>,
    pub generation_run_id: Uuid,
    pub holder_id: Uuid,
    #[serde(default)]
    pub patient_id: Option<Uuid>,
    pub hold_type: HoldType,
    #[serde(default)]
    pub ttl_minutes: Option<u32>,
}

/// Payload of `release_hold`; the command targets the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseHold {
    pub hold_id: Uuid,
    pub generation_run_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Payload of `expire_hold`; the command targets the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpireHold {
    pub hold_id: Uuid,
    pub generation_run_id: Uuid,
}

/// Payload of `block_slot` and `unblock_slot`; the command targets the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotAdministration {
    pub generation_run_id: Uuid,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Payload of `book_appointment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookAppointment {
    #[serde(default)]
    pub appointment_id: Option<Uuid>,
    pub slot_id: Uuid,
    pub generation_run_id: Uuid,
    pub patient_id: Uuid,
    pub consultation_mode: ConsultationMode,
    /// The caller's own hold on the slot, if any.
    #[serde(default)]
    pub hold_id: Option<Uuid>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Payload of `cancel_appointment`; the command targets the appointment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAppointment {
    pub reason: String,
}
