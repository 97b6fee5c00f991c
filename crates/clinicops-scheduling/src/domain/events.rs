//! Domain events for the Scheduling context.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clinicops_core::event::{AggregateType, DomainEvent};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::aggregates::SlotStatus;
use super::slot_planning::{ConsultationMode, DayOfWeek, HoldType, ScheduleSource, SlotWindow};

pub const DOCTOR_PROFILE_CREATED_EVENT_TYPE: &str = "doctor_profile_created";
pub const DOCTOR_PROFILE_ACTIVATED_EVENT_TYPE: &str = "doctor_profile_activated";
pub const DOCTOR_PROFILE_UPDATED_EVENT_TYPE: &str = "doctor_profile_updated";
pub const DOCTOR_SCHEDULE_CREATED_EVENT_TYPE: &str = "doctor_schedule_created";
pub const DOCTOR_SCHEDULE_UPDATED_EVENT_TYPE: &str = "doctor_schedule_updated";
pub const DOCTOR_SCHEDULE_DEACTIVATED_EVENT_TYPE: &str = "doctor_schedule_deactivated";
pub const SCHEDULE_OVERRIDE_CREATED_EVENT_TYPE: &str = "schedule_override_created";
pub const SCHEDULE_OVERRIDE_CANCELLED_EVENT_TYPE: &str = "schedule_override_cancelled";
pub const LEAVE_REQUEST_SUBMITTED_EVENT_TYPE: &str = "leave_request_submitted";
pub const LEAVE_REQUEST_APPROVED_EVENT_TYPE: &str = "leave_request_approved";
pub const LEAVE_REQUEST_REJECTED_EVENT_TYPE: &str = "leave_request_rejected";
pub const HOLIDAY_DECLARED_EVENT_TYPE: &str = "holiday_declared";
pub const HOLIDAY_CANCELLED_EVENT_TYPE: &str = "holiday_cancelled";
pub const EMERGENCY_UNAVAILABILITY_DECLARED_EVENT_TYPE: &str = "emergency_unavailability_declared";
pub const EMERGENCY_UNAVAILABILITY_RESOLVED_EVENT_TYPE: &str = "emergency_unavailability_resolved";
pub const FORCED_BLOCK_CREATED_EVENT_TYPE: &str = "forced_block_created";
pub const FORCED_BLOCK_LIFTED_EVENT_TYPE: &str = "forced_block_lifted";
pub const SLOTS_GENERATED_EVENT_TYPE: &str = "slots_generated";
pub const SLOT_HOLD_PLACED_EVENT_TYPE: &str = "slot_hold_placed";
pub const SLOT_HOLD_RELEASED_EVENT_TYPE: &str = "slot_hold_released";
pub const SLOT_HOLD_EXPIRED_EVENT_TYPE: &str = "slot_hold_expired";
pub const SLOT_BOOKED_EVENT_TYPE: &str = "slot_booked";
pub const SLOT_BOOKING_CANCELLED_EVENT_TYPE: &str = "slot_booking_cancelled";
pub const SLOT_BLOCKED_EVENT_TYPE: &str = "slot_blocked";
pub const SLOT_UNBLOCKED_EVENT_TYPE: &str = "slot_unblocked";
pub const SLOT_WITHDRAWN_EVENT_TYPE: &str = "slot_withdrawn";
pub const APPOINTMENT_BOOKED_EVENT_TYPE: &str = "appointment_booked";
pub const APPOINTMENT_CANCELLED_EVENT_TYPE: &str = "appointment_cancelled";

/// Closes a record: a schedule deactivated, an override or holiday
/// cancelled, an emergency resolved or a block lifted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordClosed {
    /// The record identifier.
    pub id: Uuid,
    /// Why it was closed.
    #[serde(default)]
    pub reason: Option<String>,
    /// When it was closed.
    pub closed_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Doctor profile
// ---------------------------------------------------------------------------

/// Emitted when a doctor profile is created. New profiles are neither
/// bookable nor visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorProfileCreated {
    pub doctor_id: Uuid,
    pub hospital_id: Uuid,
    pub full_name: String,
    pub specialty: String,
    pub license_number: Option<String>,
}

/// Emitted when a profile goes live; it becomes bookable and visible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorProfileActivated {
    pub doctor_id: Uuid,
    pub activated_at: DateTime<Utc>,
}

/// Emitted when profile fields change. Only changed fields are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DoctorProfileUpdated {
    pub doctor_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_bookable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_visible: Option<bool>,
}

/// Event payload variants for the doctor profile stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum DoctorProfileEvent {
    DoctorProfileCreated(DoctorProfileCreated),
    DoctorProfileActivated(DoctorProfileActivated),
    DoctorProfileUpdated(DoctorProfileUpdated),
}

impl DomainEvent for DoctorProfileEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::DoctorProfile;

    fn event_type(&self) -> &'static str {
        match self {
            Self::DoctorProfileCreated(_) => DOCTOR_PROFILE_CREATED_EVENT_TYPE,
            Self::DoctorProfileActivated(_) => DOCTOR_PROFILE_ACTIVATED_EVENT_TYPE,
            Self::DoctorProfileUpdated(_) => DOCTOR_PROFILE_UPDATED_EVENT_TYPE,
        }
    }
}

// ---------------------------------------------------------------------------
// Availability inputs
// ---------------------------------------------------------------------------

/// Emitted when a recurring weekly schedule is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorScheduleCreated {
    pub schedule_id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: DayOfWeek,
    #[serde(flatten)]
    pub window: SlotWindow,
    pub effective_from: NaiveDate,
    pub effective_until: Option<NaiveDate>,
}

/// Emitted when a schedule changes; carries the full resulting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorScheduleUpdated {
    pub schedule_id: Uuid,
    #[serde(flatten)]
    pub window: SlotWindow,
    pub effective_until: Option<NaiveDate>,
}

/// Event payload variants for the doctor schedule stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum DoctorScheduleEvent {
    DoctorScheduleCreated(DoctorScheduleCreated),
    DoctorScheduleUpdated(DoctorScheduleUpdated),
    DoctorScheduleDeactivated(RecordClosed),
}

impl DomainEvent for DoctorScheduleEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::DoctorSchedule;

    fn event_type(&self) -> &'static str {
        match self {
            Self::DoctorScheduleCreated(_) => DOCTOR_SCHEDULE_CREATED_EVENT_TYPE,
            Self::DoctorScheduleUpdated(_) => DOCTOR_SCHEDULE_UPDATED_EVENT_TYPE,
            Self::DoctorScheduleDeactivated(_) => DOCTOR_SCHEDULE_DEACTIVATED_EVENT_TYPE,
        }
    }
}

/// Emitted when a per-date override is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleOverrideCreated {
    pub override_id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub is_available: bool,
    pub window: Option<SlotWindow>,
    pub reason: Option<String>,
}

/// Event payload variants for the schedule override stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum ScheduleOverrideEvent {
    ScheduleOverrideCreated(ScheduleOverrideCreated),
    ScheduleOverrideCancelled(RecordClosed),
}

impl DomainEvent for ScheduleOverrideEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::ScheduleOverride;

    fn event_type(&self) -> &'static str {
        match self {
            Self::ScheduleOverrideCreated(_) => SCHEDULE_OVERRIDE_CREATED_EVENT_TYPE,
            Self::ScheduleOverrideCancelled(_) => SCHEDULE_OVERRIDE_CANCELLED_EVENT_TYPE,
        }
    }
}

/// Emitted when a doctor asks for leave.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequestSubmitted {
    pub leave_id: Uuid,
    pub doctor_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub leave_type: String,
    pub reason: String,
}

/// Emitted when a pending leave request is approved or rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaveRequestReviewed {
    pub leave_id: Uuid,
    pub reviewed_by: Option<Uuid>,
    pub note: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

/// Event payload variants for the leave request stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum LeaveRequestEvent {
    LeaveRequestSubmitted(LeaveRequestSubmitted),
    LeaveRequestApproved(LeaveRequestReviewed),
    LeaveRequestRejected(LeaveRequestReviewed),
}

impl DomainEvent for LeaveRequestEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::LeaveRequest;

    fn event_type(&self) -> &'static str {
        match self {
            Self::LeaveRequestSubmitted(_) => LEAVE_REQUEST_SUBMITTED_EVENT_TYPE,
            Self::LeaveRequestApproved(_) => LEAVE_REQUEST_APPROVED_EVENT_TYPE,
            Self::LeaveRequestRejected(_) => LEAVE_REQUEST_REJECTED_EVENT_TYPE,
        }
    }
}

/// Emitted when a hospital declares a holiday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolidayDeclared {
    pub holiday_id: Uuid,
    pub hospital_id: Uuid,
    pub date: NaiveDate,
    pub name: String,
}

/// Event payload variants for the holiday stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum HolidayEvent {
    HolidayDeclared(HolidayDeclared),
    HolidayCancelled(RecordClosed),
}

impl DomainEvent for HolidayEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::Holiday;

    fn event_type(&self) -> &'static str {
        match self {
            Self::HolidayDeclared(_) => HOLIDAY_DECLARED_EVENT_TYPE,
            Self::HolidayCancelled(_) => HOLIDAY_CANCELLED_EVENT_TYPE,
        }
    }
}

/// Emitted when a doctor becomes unavailable at short notice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyUnavailabilityDeclared {
    pub emergency_id: Uuid,
    pub doctor_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

/// Event payload variants for the emergency unavailability stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum EmergencyUnavailabilityEvent {
    EmergencyUnavailabilityDeclared(EmergencyUnavailabilityDeclared),
    EmergencyUnavailabilityResolved(RecordClosed),
}

impl DomainEvent for EmergencyUnavailabilityEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::EmergencyUnavailability;

    fn event_type(&self) -> &'static str {
        match self {
            Self::EmergencyUnavailabilityDeclared(_) => EMERGENCY_UNAVAILABILITY_DECLARED_EVENT_TYPE,
            Self::EmergencyUnavailabilityResolved(_) => EMERGENCY_UNAVAILABILITY_RESOLVED_EVENT_TYPE,
        }
    }
}

/// Emitted when an administrator blocks a hospital or a doctor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForcedBlockCreated {
    pub block_id: Uuid,
    pub hospital_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: String,
}

/// Event payload variants for the forced block stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum ForcedBlockEvent {
    ForcedBlockCreated(ForcedBlockCreated),
    ForcedBlockLifted(RecordClosed),
}

impl DomainEvent for ForcedBlockEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::ForcedBlock;

    fn event_type(&self) -> &'static str {
        match self {
            Self::ForcedBlockCreated(_) => FORCED_BLOCK_CREATED_EVENT_TYPE,
            Self::ForcedBlockLifted(_) => FORCED_BLOCK_LIFTED_EVENT_TYPE,
        }
    }
}

// ---------------------------------------------------------------------------
// Slot generation
// ---------------------------------------------------------------------------

/// One slot created by a generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSlot {
    pub slot_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub duration_minutes: u32,
    pub consultation_mode: ConsultationMode,
    pub max_capacity: u32,
    #[serde(default)]
    pub location_id: Option<Uuid>,
    pub schedule_source: ScheduleSource,
}

impl GeneratedSlot {
    /// Slot start as a UTC instant.
    #[must_use]
    pub fn starts_at(&self) -> DateTime<Utc> {
        self.date.and_time(self.start_time).and_utc()
    }
}

/// Emitted once per generation run with every slot it created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotsGenerated {
    pub run_id: Uuid,
    pub doctor_id: Uuid,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub slots: Vec<GeneratedSlot>,
    pub generated_at: DateTime<Utc>,
}

/// Event payload variants for the slot generation stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum SlotGenerationEvent {
    SlotsGenerated(SlotsGenerated),
}

impl DomainEvent for SlotGenerationEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::SlotGeneration;

    fn event_type(&self) -> &'static str {
        match self {
            Self::SlotsGenerated(_) => SLOTS_GENERATED_EVENT_TYPE,
        }
    }
}

// ---------------------------------------------------------------------------
// Slot lifecycle
// ---------------------------------------------------------------------------

/// Booking counters and status after a booking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOccupancy {
    pub current_bookings: u32,
    pub in_person_bookings: u32,
    pub virtual_bookings: u32,
    pub status: SlotStatus,
}

/// Emitted when a tentative hold is placed on a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotHoldPlaced {
    pub hold_id: Uuid,
    pub slot_id: Uuid,
    pub holder_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub hold_type: HoldType,
    pub placed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Emitted when a hold is released by its holder or by a booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotHoldReleased {
    pub hold_id: Uuid,
    pub slot_id: Uuid,
    pub reason: String,
    pub released_at: DateTime<Utc>,
}

/// Emitted when the sweeper retires a hold past its expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotHoldExpired {
    pub hold_id: Uuid,
    pub slot_id: Uuid,
    pub expired_at: DateTime<Utc>,
}

/// Emitted on the slot stream when an appointment takes capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotBooked {
    pub slot_id: Uuid,
    pub appointment_id: Uuid,
    pub patient_id: Uuid,
    pub consultation_mode: ConsultationMode,
    /// The caller's hold, released by this booking.
    pub released_hold_id: Option<Uuid>,
    pub occupancy: SlotOccupancy,
    pub booked_at: DateTime<Utc>,
}

/// Emitted on the slot stream when a cancelled appointment returns capacity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotBookingCancelled {
    pub slot_id: Uuid,
    pub appointment_id: Uuid,
    pub consultation_mode: ConsultationMode,
    pub occupancy: SlotOccupancy,
    pub cancelled_at: DateTime<Utc>,
}

/// Emitted when staff block or unblock a slot, or regeneration withdraws it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotStatusChanged {
    pub slot_id: Uuid,
    pub status: SlotStatus,
    pub reason: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// Event payload variants for the appointment slot stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum AppointmentSlotEvent {
    SlotHoldPlaced(SlotHoldPlaced),
    SlotHoldReleased(SlotHoldReleased),
    SlotHoldExpired(SlotHoldExpired),
    SlotBooked(SlotBooked),
    SlotBookingCancelled(SlotBookingCancelled),
    SlotBlocked(SlotStatusChanged),
    SlotUnblocked(SlotStatusChanged),
    SlotWithdrawn(SlotStatusChanged),
}

impl DomainEvent for AppointmentSlotEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::AppointmentSlot;

    fn event_type(&self) -> &'static str {
        match self {
            Self::SlotHoldPlaced(_) => SLOT_HOLD_PLACED_EVENT_TYPE,
            Self::SlotHoldReleased(_) => SLOT_HOLD_RELEASED_EVENT_TYPE,
            Self::SlotHoldExpired(_) => SLOT_HOLD_EXPIRED_EVENT_TYPE,
            Self::SlotBooked(_) => SLOT_BOOKED_EVENT_TYPE,
            Self::SlotBookingCancelled(_) => SLOT_BOOKING_CANCELLED_EVENT_TYPE,
            Self::SlotBlocked(_) => SLOT_BLOCKED_EVENT_TYPE,
            Self::SlotUnblocked(_) => SLOT_UNBLOCKED_EVENT_TYPE,
            Self::SlotWithdrawn(_) => SLOT_WITHDRAWN_EVENT_TYPE,
        }
    }
}

// ---------------------------------------------------------------------------
// Appointments
// ---------------------------------------------------------------------------

/// Emitted when a patient is booked into a slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentBooked {
    pub appointment_id: Uuid,
    pub slot_id: Uuid,
    pub generation_run_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub consultation_mode: ConsultationMode,
    pub reason: Option<String>,
    pub booked_at: DateTime<Utc>,
}

/// Emitted when a booked appointment is cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppointmentCancelled {
    pub appointment_id: Uuid,
    pub slot_id: Uuid,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

/// Event payload variants for the appointment stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum AppointmentEvent {
    AppointmentBooked(AppointmentBooked),
    AppointmentCancelled(AppointmentCancelled),
}

impl DomainEvent for AppointmentEvent {
    const AGGREGATE_TYPE: AggregateType = AggregateType::Appointment;

    fn event_type(&self) -> &'static str {
        match self {
            Self::AppointmentBooked(_) => APPOINTMENT_BOOKED_EVENT_TYPE,
            Self::AppointmentCancelled(_) => APPOINTMENT_CANCELLED_EVENT_TYPE,
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_slot_event_encodes_with_snake_case_type() {
        // Arrange
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let event = AppointmentSlotEvent::SlotBlocked(SlotStatusChanged {
            slot_id: Uuid::nil(),
            status: SlotStatus::Blocked,
            reason: Some("maintenance".into()),
            changed_at: at,
        });

        // Act
        let (event_type, payload) = event.encode().unwrap();

        // Assert
        assert_eq!(event_type, SLOT_BLOCKED_EVENT_TYPE);
        assert_eq!(payload["status"], "blocked");
        assert_eq!(payload["reason"], "maintenance");
    }

    #[test]
    fn test_schedule_created_flattens_window() {
        let event = DoctorScheduleEvent::DoctorScheduleCreated(DoctorScheduleCreated {
            schedule_id: Uuid::nil(),
            doctor_id: Uuid::nil(),
            day_of_week: DayOfWeek::Monday,
            window: SlotWindow {
                start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
                slot_duration_minutes: 30,
                buffer_minutes: 0,
                consultation_mode: ConsultationMode::Hybrid,
                max_capacity: 2,
                location_id: None,
            },
            effective_from: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            effective_until: None,
        });

        let (_, payload) = event.encode().unwrap();

        assert_eq!(payload["day_of_week"], "monday");
        assert_eq!(payload["start_time"], "09:00:00");
        assert_eq!(payload["consultation_mode"], "hybrid");
    }
}
