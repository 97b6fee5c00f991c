//! Tables holding the inputs of slot generation: weekly schedules,
//! overrides, leave, holidays, emergencies and forced blocks.

use chrono::{DateTime, NaiveDate, Utc};
use clinicops_core::event::Event;
use clinicops_core::read_model::{ReadModelTable, ReadModelWrite};
use clinicops_scheduling::domain::aggregates::LeaveStatus;
use clinicops_scheduling::domain::events::{
    DOCTOR_SCHEDULE_CREATED_EVENT_TYPE, DOCTOR_SCHEDULE_DEACTIVATED_EVENT_TYPE,
    DOCTOR_SCHEDULE_UPDATED_EVENT_TYPE, DoctorScheduleEvent,
    EMERGENCY_UNAVAILABILITY_DECLARED_EVENT_TYPE, EMERGENCY_UNAVAILABILITY_RESOLVED_EVENT_TYPE,
    EmergencyUnavailabilityEvent, FORCED_BLOCK_CREATED_EVENT_TYPE, FORCED_BLOCK_LIFTED_EVENT_TYPE,
    ForcedBlockEvent, HOLIDAY_CANCELLED_EVENT_TYPE, HOLIDAY_DECLARED_EVENT_TYPE, HolidayEvent,
    LEAVE_REQUEST_APPROVED_EVENT_TYPE, LEAVE_REQUEST_REJECTED_EVENT_TYPE,
    LEAVE_REQUEST_SUBMITTED_EVENT_TYPE, LeaveRequestEvent, LeaveRequestReviewed, RecordClosed,
    SCHEDULE_OVERRIDE_CANCELLED_EVENT_TYPE, SCHEDULE_OVERRIDE_CREATED_EVENT_TYPE,
    ScheduleOverrideEvent,
};
use clinicops_scheduling::domain::read_models::{
    DoctorScheduleRow, EmergencyUnavailabilityRow, ForcedBlockRow, HolidayRow, LeaveRequestRow,
    RecordStatus, ScheduleOverrideRow,
};
use clinicops_scheduling::domain::slot_planning::SlotWindow;
use serde::Serialize;

use crate::error::ProjectionError;
use crate::handler::{ProjectionHandler, StatusChange, decode, insert, patch};

fn close(
    table: ReadModelTable,
    event: &Event,
    closed: &RecordClosed,
    status: RecordStatus,
) -> Result<ReadModelWrite, ProjectionError> {
    patch(table, event, closed.id, &StatusChange { status })
}

#[derive(Serialize)]
struct ScheduleRevision {
    #[serde(flatten)]
    window: SlotWindow,
    effective_until: Option<NaiveDate>,
}

/// Maintains `doctor_schedules`.
pub struct DoctorScheduleProjection;

impl ProjectionHandler for DoctorScheduleProjection {
    fn name(&self) -> &'static str {
        "doctor_schedules"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            DOCTOR_SCHEDULE_CREATED_EVENT_TYPE,
            DOCTOR_SCHEDULE_UPDATED_EVENT_TYPE,
            DOCTOR_SCHEDULE_DEACTIVATED_EVENT_TYPE,
        ]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let table = ReadModelTable::DoctorSchedules;
        let write = match decode::<DoctorScheduleEvent>(event)? {
            DoctorScheduleEvent::DoctorScheduleCreated(s) => insert(
                table,
                event,
                s.schedule_id,
                &DoctorScheduleRow {
                    schedule_id: s.schedule_id,
                    doctor_id: s.doctor_id,
                    day_of_week: s.day_of_week,
                    window: s.window,
                    effective_from: s.effective_from,
                    effective_until: s.effective_until,
                    status: RecordStatus::Active,
                },
            )?,
            DoctorScheduleEvent::DoctorScheduleUpdated(s) => patch(
                table,
                event,
                s.schedule_id,
                &ScheduleRevision {
                    window: s.window,
                    effective_until: s.effective_until,
                },
            )?,
            DoctorScheduleEvent::DoctorScheduleDeactivated(c) => {
                close(table, event, &c, RecordStatus::Inactive)?
            }
        };
        Ok(vec![write])
    }
}

/// Maintains `schedule_overrides`.
pub struct ScheduleOverrideProjection;

impl ProjectionHandler for ScheduleOverrideProjection {
    fn name(&self) -> &'static str {
        "schedule_overrides"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            SCHEDULE_OVERRIDE_CREATED_EVENT_TYPE,
            SCHEDULE_OVERRIDE_CANCELLED_EVENT_TYPE,
        ]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let table = ReadModelTable::ScheduleOverrides;
        let write = match decode::<ScheduleOverrideEvent>(event)? {
            ScheduleOverrideEvent::ScheduleOverrideCreated(o) => insert(
                table,
                event,
                o.override_id,
                &ScheduleOverrideRow {
                    override_id: o.override_id,
                    doctor_id: o.doctor_id,
                    date: o.date,
                    is_available: o.is_available,
                    window: o.window,
                    reason: o.reason,
                    status: RecordStatus::Active,
                },
            )?,
            ScheduleOverrideEvent::ScheduleOverrideCancelled(c) => {
                close(table, event, &c, RecordStatus::Cancelled)?
            }
        };
        Ok(vec![write])
    }
}

#[derive(Serialize)]
struct LeaveReview {
    status: LeaveStatus,
    reviewed_by: Option<uuid::Uuid>,
    review_note: Option<String>,
    reviewed_at: DateTime<Utc>,
}

impl LeaveReview {
    fn new(status: LeaveStatus, review: LeaveRequestReviewed) -> Self {
        Self {
            status,
            reviewed_by: review.reviewed_by,
            review_note: review.note,
            reviewed_at: review.reviewed_at,
        }
    }
}

/// Maintains `leave_requests`.
pub struct LeaveRequestProjection;

impl ProjectionHandler for LeaveRequestProjection {
    fn name(&self) -> &'static str {
        "leave_requests"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            LEAVE_REQUEST_SUBMITTED_EVENT_TYPE,
            LEAVE_REQUEST_APPROVED_EVENT_TYPE,
            LEAVE_REQUEST_REJECTED_EVENT_TYPE,
        ]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let table = ReadModelTable::LeaveRequests;
        let write = match decode::<LeaveRequestEvent>(event)? {
            LeaveRequestEvent::LeaveRequestSubmitted(l) => insert(
                table,
                event,
                l.leave_id,
                &LeaveRequestRow {
                    leave_id: l.leave_id,
                    doctor_id: l.doctor_id,
                    start_date: l.start_date,
                    end_date: l.end_date,
                    leave_type: l.leave_type,
                    reason: l.reason,
                    status: LeaveStatus::Pending,
                    reviewed_by: None,
                    review_note: None,
                    reviewed_at: None,
                },
            )?,
            LeaveRequestEvent::LeaveRequestApproved(r) => {
                let id = r.leave_id;
                patch(table, event, id, &LeaveReview::new(LeaveStatus::Approved, r))?
            }
            LeaveRequestEvent::LeaveRequestRejected(r) => {
                let id = r.leave_id;
                patch(table, event, id, &LeaveReview::new(LeaveStatus::Rejected, r))?
            }
        };
        Ok(vec![write])
    }
}

/// Maintains `holidays`.
pub struct HolidayProjection;

impl ProjectionHandler for HolidayProjection {
    fn name(&self) -> &'static str {
        "holidays"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[HOLIDAY_DECLARED_EVENT_TYPE, HOLIDAY_CANCELLED_EVENT_TYPE]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let table = ReadModelTable::Holidays;
        let write = match decode::<HolidayEvent>(event)? {
            HolidayEvent::HolidayDeclared(h) => insert(
                table,
                event,
                h.holiday_id,
                &HolidayRow {
                    holiday_id: h.holiday_id,
                    hospital_id: h.hospital_id,
                    date: h.date,
                    name: h.name,
                    status: RecordStatus::Active,
                },
            )?,
            HolidayEvent::HolidayCancelled(c) => close(table, event, &c, RecordStatus::Cancelled)?,
        };
        Ok(vec![write])
    }
}

/// Maintains `emergency_unavailability`.
pub struct EmergencyUnavailabilityProjection;

impl ProjectionHandler for EmergencyUnavailabilityProjection {
    fn name(&self) -> &'static str {
        "emergency_unavailability"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            EMERGENCY_UNAVAILABILITY_DECLARED_EVENT_TYPE,
            EMERGENCY_UNAVAILABILITY_RESOLVED_EVENT_TYPE,
        ]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let table = ReadModelTable::EmergencyUnavailability;
        let write = match decode::<EmergencyUnavailabilityEvent>(event)? {
            EmergencyUnavailabilityEvent::EmergencyUnavailabilityDeclared(e) => insert(
                table,
                event,
                e.emergency_id,
                &EmergencyUnavailabilityRow {
                    emergency_id: e.emergency_id,
                    doctor_id: e.doctor_id,
                    start_date: e.start_date,
                    end_date: e.end_date,
                    reason: e.reason,
                    status: RecordStatus::Active,
                },
            )?,
            EmergencyUnavailabilityEvent::EmergencyUnavailabilityResolved(c) => {
                close(table, event, &c, RecordStatus::Resolved)?
            }
        };
        Ok(vec![write])
    }
}

/// Maintains `forced_blocks`.
pub struct ForcedBlockProjection;

impl ProjectionHandler for ForcedBlockProjection {
    fn name(&self) -> &'static str {
        "forced_blocks"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[FORCED_BLOCK_CREATED_EVENT_TYPE, FORCED_BLOCK_LIFTED_EVENT_TYPE]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let table = ReadModelTable::ForcedBlocks;
        let write = match decode::<ForcedBlockEvent>(event)? {
            ForcedBlockEvent::ForcedBlockCreated(b) => insert(
                table,
                event,
                b.block_id,
                &ForcedBlockRow {
                    block_id: b.block_id,
                    hospital_id: b.hospital_id,
                    doctor_id: b.doctor_id,
                    start_date: b.start_date,
                    end_date: b.end_date,
                    reason: b.reason,
                    status: RecordStatus::Active,
                },
            )?,
            ForcedBlockEvent::ForcedBlockLifted(c) => close(table, event, &c, RecordStatus::Lifted)?,
        };
        Ok(vec![write])
    }
}
