//! Aggregates for the inputs that shape a doctor's calendar.

use chrono::{DateTime, Utc};
use clinicops_core::aggregate::AggregateRoot;
use clinicops_core::error::{DomainError, ValidationErrors};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::commands::{
    CreateDoctorSchedule, CreateForcedBlock, CreateScheduleOverride, DeclareEmergencyUnavailability,
    DeclareHoliday, SubmitLeaveRequest, UpdateDoctorSchedule,
};
use crate::domain::events::{
    DoctorScheduleCreated, DoctorScheduleEvent, DoctorScheduleUpdated,
    EmergencyUnavailabilityDeclared, EmergencyUnavailabilityEvent, ForcedBlockCreated,
    ForcedBlockEvent, HolidayDeclared, HolidayEvent, LeaveRequestEvent, LeaveRequestReviewed,
    LeaveRequestSubmitted, RecordClosed, ScheduleOverrideCreated, ScheduleOverrideEvent,
};
use crate::domain::slot_planning::{DateSpan, SlotWindow};

fn close(
    active: bool,
    state: &str,
    id: Uuid,
    reason: Option<String>,
    at: DateTime<Utc>,
) -> Result<RecordClosed, DomainError> {
    if !active {
        return Err(DomainError::invalid("status", format!("record is already {state}")));
    }
    Ok(RecordClosed {
        id,
        reason,
        closed_at: at,
    })
}

macro_rules! aggregate_basics {
    () => {
        fn aggregate_id(&self) -> Uuid {
            self.id
        }

        fn version(&self) -> i64 {
            self.version
        }
    };
}

/// The aggregate root for a recurring weekly schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorSchedule {
    pub id: Uuid,
    pub version: i64,
    pub doctor_id: Option<Uuid>,
    pub window: Option<SlotWindow>,
    pub effective_from: Option<chrono::NaiveDate>,
    pub effective_until: Option<chrono::NaiveDate>,
    pub active: bool,
}

impl DoctorSchedule {
    /// Validates a new schedule and produces its event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` listing every invalid field.
    pub fn create(
        schedule_id: Uuid,
        command: &CreateDoctorSchedule,
    ) -> Result<DoctorScheduleEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        command.window.check(&mut errors);
        if let Some(until) = command.effective_until {
            errors.check(
                until >= command.effective_from,
                "effective_until",
                "must not be before effective_from",
            );
        }
        errors.into_result()?;

        Ok(DoctorScheduleEvent::DoctorScheduleCreated(DoctorScheduleCreated {
            schedule_id,
            doctor_id: command.doctor_id,
            day_of_week: command.day_of_week,
            window: command.window.clone(),
            effective_from: command.effective_from,
            effective_until: command.effective_until,
        }))
    }

    /// Merges a change into the window and validates the result.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the schedule is inactive, nothing
    /// changes, or the merged window is invalid.
    pub fn update(&self, command: &UpdateDoctorSchedule) -> Result<DoctorScheduleEvent, DomainError> {
        let Some(current) = self.window.as_ref().filter(|_| self.active) else {
            return Err(DomainError::invalid("status", "schedule is not active"));
        };
        let mut window = current.clone();
        if let Some(v) = command.start_time {
            window.start_time = v;
        }
        if let Some(v) = command.end_time {
            window.end_time = v;
        }
        if let Some(v) = command.slot_duration_minutes {
            window.slot_duration_minutes = v;
        }
        if let Some(v) = command.buffer_minutes {
            window.buffer_minutes = v;
        }
        if let Some(v) = command.consultation_mode {
            window.consultation_mode = v;
        }
        if let Some(v) = command.max_capacity {
            window.max_capacity = v;
        }
        let effective_until = command.effective_until.or(self.effective_until);

        let mut errors = ValidationErrors::new();
        errors.check(
            window != *current || effective_until != self.effective_until,
            "payload",
            "at least one field must change",
        );
        window.check(&mut errors);
        if let (Some(from), Some(until)) = (self.effective_from, effective_until) {
            errors.check(until >= from, "effective_until", "must not be before effective_from");
        }
        errors.into_result()?;

        Ok(DoctorScheduleEvent::DoctorScheduleUpdated(DoctorScheduleUpdated {
            schedule_id: self.id,
            window,
            effective_until,
        }))
    }

    /// Deactivates the schedule.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if it is already inactive.
    pub fn deactivate(
        &self,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<DoctorScheduleEvent, DomainError> {
        close(self.active, "inactive", self.id, reason, at).map(DoctorScheduleEvent::DoctorScheduleDeactivated)
    }
}

impl AggregateRoot for DoctorSchedule {
    type Event = DoctorScheduleEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            doctor_id: None,
            window: None,
            effective_from: None,
            effective_until: None,
            active: false,
        }
    }

    aggregate_basics!();

    fn apply(&mut self, event: &DoctorScheduleEvent) {
        match event {
            DoctorScheduleEvent::DoctorScheduleCreated(e) => {
                self.doctor_id = Some(e.doctor_id);
                self.window = Some(e.window.clone());
                self.effective_from = Some(e.effective_from);
                self.effective_until = e.effective_until;
                self.active = true;
            }
            DoctorScheduleEvent::DoctorScheduleUpdated(e) => {
                self.window = Some(e.window.clone());
                self.effective_until = e.effective_until;
            }
            DoctorScheduleEvent::DoctorScheduleDeactivated(_) => self.active = false,
        }
        self.version += 1;
    }
}

/// The aggregate root for a per-date override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleOverride {
    pub id: Uuid,
    pub version: i64,
    pub active: bool,
}

impl ScheduleOverride {
    /// Validates a new override and produces its event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if an available override lacks a
    /// valid window or an unavailable one carries a window.
    pub fn create(
        override_id: Uuid,
        command: &CreateScheduleOverride,
    ) -> Result<ScheduleOverrideEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        match (&command.window, command.is_available) {
            (Some(window), true) => window.check(&mut errors),
            (None, true) => errors.push("window", "is required when the doctor is available"),
            (Some(_), false) => errors.push("window", "must be omitted when the doctor is unavailable"),
            (None, false) => {}
        }
        errors.into_result()?;

        Ok(ScheduleOverrideEvent::ScheduleOverrideCreated(ScheduleOverrideCreated {
            override_id,
            doctor_id: command.doctor_id,
            date: command.date,
            is_available: command.is_available,
            window: command.window.clone(),
            reason: command.reason.clone(),
        }))
    }

    /// Cancels the override.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if it is already cancelled.
    pub fn cancel(
        &self,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<ScheduleOverrideEvent, DomainError> {
        close(self.active, "cancelled", self.id, reason, at).map(ScheduleOverrideEvent::ScheduleOverrideCancelled)
    }
}

impl AggregateRoot for ScheduleOverride {
    type Event = ScheduleOverrideEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            active: false,
        }
    }

    aggregate_basics!();

    fn apply(&mut self, event: &ScheduleOverrideEvent) {
        self.active = matches!(event, ScheduleOverrideEvent::ScheduleOverrideCreated(_));
        self.version += 1;
    }
}

/// Review state of a leave request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaveStatus {
    Pending,
    Approved,
    Rejected,
}

/// The aggregate root for a leave request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: Uuid,
    pub version: i64,
    pub status: Option<LeaveStatus>,
}

impl LeaveRequest {
    /// Validates a submission and produces its event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` listing every invalid field.
    pub fn submit(
        leave_id: Uuid,
        command: &SubmitLeaveRequest,
    ) -> Result<LeaveRequestEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        DateSpan {
            start_date: command.start_date,
            end_date: command.end_date,
        }
        .check(&mut errors);
        errors.require_text(&command.leave_type, "leave_type");
        errors.require_text(&command.reason, "reason");
        errors.into_result()?;

        Ok(LeaveRequestEvent::LeaveRequestSubmitted(LeaveRequestSubmitted {
            leave_id,
            doctor_id: command.doctor_id,
            start_date: command.start_date,
            end_date: command.end_date,
            leave_type: command.leave_type.trim().to_owned(),
            reason: command.reason.trim().to_owned(),
        }))
    }

    /// Approves or rejects a pending request.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless the request is pending.
    pub fn review(
        &self,
        approve: bool,
        reviewed_by: Option<Uuid>,
        note: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<LeaveRequestEvent, DomainError> {
        if self.status != Some(LeaveStatus::Pending) {
            return Err(DomainError::invalid("status", "only pending requests can be reviewed"));
        }
        let reviewed = LeaveRequestReviewed {
            leave_id: self.id,
            reviewed_by,
            note,
            reviewed_at: at,
        };
        Ok(if approve {
            LeaveRequestEvent::LeaveRequestApproved(reviewed)
        } else {
            LeaveRequestEvent::LeaveRequestRejected(reviewed)
        })
    }
}

impl AggregateRoot for LeaveRequest {
    type Event = LeaveRequestEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            status: None,
        }
    }

    aggregate_basics!();

    fn apply(&mut self, event: &LeaveRequestEvent) {
        self.status = Some(match event {
            LeaveRequestEvent::LeaveRequestSubmitted(_) => LeaveStatus::Pending,
            LeaveRequestEvent::LeaveRequestApproved(_) => LeaveStatus::Approved,
            LeaveRequestEvent::LeaveRequestRejected(_) => LeaveStatus::Rejected,
        });
        self.version += 1;
    }
}

/// The aggregate root for a hospital holiday.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holiday {
    pub id: Uuid,
    pub version: i64,
    pub active: bool,
}

impl Holiday {
    /// Validates a declaration and produces its event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the name is blank.
    pub fn declare(holiday_id: Uuid, command: &DeclareHoliday) -> Result<HolidayEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        errors.require_text(&command.name, "name");
        errors.into_result()?;

        Ok(HolidayEvent::HolidayDeclared(HolidayDeclared {
            holiday_id,
            hospital_id: command.hospital_id,
            date: command.date,
            name: command.name.trim().to_owned(),
        }))
    }

    /// Cancels the holiday.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if it is already cancelled.
    pub fn cancel(&self, reason: Option<String>, at: DateTime<Utc>) -> Result<HolidayEvent, DomainError> {
        close(self.active, "cancelled", self.id, reason, at).map(HolidayEvent::HolidayCancelled)
    }
}

impl AggregateRoot for Holiday {
    type Event = HolidayEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            active: false,
        }
    }

    aggregate_basics!();

    fn apply(&mut self, event: &HolidayEvent) {
        self.active = matches!(event, HolidayEvent::HolidayDeclared(_));
        self.version += 1;
    }
}

/// The aggregate root for an emergency unavailability window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyUnavailability {
    pub id: Uuid,
    pub version: i64,
    pub active: bool,
}

impl EmergencyUnavailability {
    /// Validates a declaration and produces its event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` listing every invalid field.
    pub fn declare(
        emergency_id: Uuid,
        command: &DeclareEmergencyUnavailability,
    ) -> Result<EmergencyUnavailabilityEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        DateSpan {
            start_date: command.start_date,
            end_date: command.end_date,
        }
        .check(&mut errors);
        errors.require_text(&command.reason, "reason");
        errors.into_result()?;

        Ok(EmergencyUnavailabilityEvent::EmergencyUnavailabilityDeclared(
            EmergencyUnavailabilityDeclared {
                emergency_id,
                doctor_id: command.doctor_id,
                start_date: command.start_date,
                end_date: command.end_date,
                reason: command.reason.trim().to_owned(),
            },
        ))
    }

    /// Marks the emergency resolved.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if it is already resolved.
    pub fn resolve(
        &self,
        reason: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<EmergencyUnavailabilityEvent, DomainError> {
        close(self.active, "resolved", self.id, reason, at)
            .map(EmergencyUnavailabilityEvent::EmergencyUnavailabilityResolved)
    }
}

impl AggregateRoot for EmergencyUnavailability {
    type Event = EmergencyUnavailabilityEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            active: false,
        }
    }

    aggregate_basics!();

    fn apply(&mut self, event: &EmergencyUnavailabilityEvent) {
        self.active = matches!(
            event,
            EmergencyUnavailabilityEvent::EmergencyUnavailabilityDeclared(_)
        );
        self.version += 1;
    }
}

/// The aggregate root for an administrative forced block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForcedBlock {
    pub id: Uuid,
    pub version: i64,
    pub active: bool,
}

impl ForcedBlock {
    /// Validates a block and produces its event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless exactly one of hospital or
    /// doctor is given, the dates are ordered and a reason is present.
    pub fn create(block_id: Uuid, command: &CreateForcedBlock) -> Result<ForcedBlockEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        errors.check(
            command.hospital_id.is_some() != command.doctor_id.is_some(),
            "scope",
            "exactly one of hospital_id or doctor_id is required",
        );
        DateSpan {
            start_date: command.start_date,
            end_date: command.end_date,
        }
        .check(&mut errors);
        errors.require_text(&command.reason, "reason");
        errors.into_result()?;

        Ok(ForcedBlockEvent::ForcedBlockCreated(ForcedBlockCreated {
            block_id,
            hospital_id: command.hospital_id,
            doctor_id: command.doctor_id,
            start_date: command.start_date,
            end_date: command.end_date,
            reason: command.reason.trim().to_owned(),
        }))
    }

    /// Lifts the block.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if it is already lifted.
    pub fn lift(&self, reason: Option<String>, at: DateTime<Utc>) -> Result<ForcedBlockEvent, DomainError> {
        close(self.active, "lifted", self.id, reason, at).map(ForcedBlockEvent::ForcedBlockLifted)
    }
}

impl AggregateRoot for ForcedBlock {
    type Event = ForcedBlockEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            active: false,
        }
    }

    aggregate_basics!();

    fn apply(&mut self, event: &ForcedBlockEvent) {
        self.active = matches!(event, ForcedBlockEvent::ForcedBlockCreated(_));
        self.version += 1;
    }
}
