//! Generation runs and the per-slot booking ledger.
//!
//! A slot's static shape (date, times, mode, capacity) is fixed by the run
//! that generated it; the slot's own stream only records what happens to it
//! afterwards. Decisions therefore take the [`GeneratedSlot`] alongside the
//! ledger.

use chrono::{DateTime, Duration, Utc};
use clinicops_core::aggregate::AggregateRoot;
use clinicops_core::error::{DomainError, ValidationErrors};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::commands::PlaceHold;
use crate::domain::events::{
    AppointmentSlotEvent, GeneratedSlot, SlotBooked, SlotBookingCancelled, SlotGenerationEvent,
    SlotHoldExpired, SlotHoldPlaced, SlotHoldReleased, SlotOccupancy, SlotStatusChanged,
};
use crate::domain::slot_planning::ConsultationMode;

/// Bookability of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// Has capacity left.
    Available,
    /// Every place is taken.
    FullyBooked,
    /// Closed by staff.
    Blocked,
    /// Retired by regeneration.
    Withdrawn,
}

impl SlotStatus {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::FullyBooked => "fully_booked",
            Self::Blocked => "blocked",
            Self::Withdrawn => "withdrawn",
        }
    }
}

/// The aggregate root for one generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotGenerationRun {
    pub id: Uuid,
    pub version: i64,
    pub doctor_id: Option<Uuid>,
    pub slots: Vec<GeneratedSlot>,
}

impl SlotGenerationRun {
    /// Finds a slot created by this run.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` if the run did not create `slot_id`.
    pub fn slot(&self, slot_id: Uuid) -> Result<&GeneratedSlot, DomainError> {
        self.slots
            .iter()
            .find(|s| s.slot_id == slot_id)
            .ok_or_else(|| DomainError::not_found("appointment_slot", slot_id))
    }
}

impl AggregateRoot for SlotGenerationRun {
    type Event = SlotGenerationEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            doctor_id: None,
            slots: Vec::new(),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &SlotGenerationEvent) {
        let SlotGenerationEvent::SlotsGenerated(e) = event;
        self.doctor_id = Some(e.doctor_id);
        self.slots.extend(e.slots.iter().cloned());
        self.version += 1;
    }
}

/// The hold currently recorded on a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveHold {
    pub hold_id: Uuid,
    pub holder_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl ActiveHold {
    /// Returns `true` while the hold still excludes others.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// The aggregate root for one slot's bookings and holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSlot {
    pub id: Uuid,
    pub version: i64,
    pub blocked: bool,
    pub withdrawn: bool,
    pub current_bookings: u32,
    pub in_person_bookings: u32,
    pub virtual_bookings: u32,
    pub active_hold: Option<ActiveHold>,
}

impl AppointmentSlot {
    /// Status derived from flags and counters.
    #[must_use]
    pub fn status(&self, planned: &GeneratedSlot) -> SlotStatus {
        if self.withdrawn {
            SlotStatus::Withdrawn
        } else if self.blocked {
            SlotStatus::Blocked
        } else if self.current_bookings >= planned.max_capacity {
            SlotStatus::FullyBooked
        } else {
            SlotStatus::Available
        }
    }

    /// The hold that currently excludes others, if any.
    #[must_use]
    pub fn live_hold(&self, now: DateTime<Utc>) -> Option<&ActiveHold> {
        self.active_hold.as_ref().filter(|h| h.is_live(now))
    }

    /// An expiry event for a recorded hold whose time has passed. Emitted
    /// ahead of any change that would otherwise overwrite it.
    #[must_use]
    pub fn lapse_expired(&self, now: DateTime<Utc>) -> Option<AppointmentSlotEvent> {
        self.active_hold
            .as_ref()
            .filter(|h| !h.is_live(now))
            .map(|h| {
                AppointmentSlotEvent::SlotHoldExpired(SlotHoldExpired {
                    hold_id: h.hold_id,
                    slot_id: self.id,
                    expired_at: now,
                })
            })
    }

    fn occupancy(&self, planned: &GeneratedSlot) -> SlotOccupancy {
        SlotOccupancy {
            current_bookings: self.current_bookings,
            in_person_bookings: self.in_person_bookings,
            virtual_bookings: self.virtual_bookings,
            status: self.status(planned),
        }
    }

    /// Places an exclusive hold.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the slot is not bookable, has
    /// started, is held by someone else, or the TTL is out of range.
    pub fn place_hold(
        &self,
        planned: &GeneratedSlot,
        hold_id: Uuid,
        command: &PlaceHold,
        now: DateTime<Utc>,
    ) -> Result<AppointmentSlotEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        let status = self.status(planned);
        if status != SlotStatus::Available {
            errors.push("slot_id", format!("slot is {}", status.as_str()));
        }
        errors.check(planned.starts_at() > now, "slot_id", "slot has already started");
        if self.live_hold(now).is_some() {
            errors.push("slot_id", "slot already has an active hold");
        }
        let ttl = match command.hold_type.ttl_minutes(command.ttl_minutes) {
            Ok(ttl) => Some(ttl),
            Err(_) => {
                errors.push("ttl_minutes", "must be between 1 and 120");
                None
            }
        };
        errors.into_result()?;

        Ok(AppointmentSlotEvent::SlotHoldPlaced(SlotHoldPlaced {
            hold_id,
            slot_id: self.id,
            holder_id: command.holder_id,
            patient_id: command.patient_id,
            hold_type: command.hold_type,
            placed_at: now,
            expires_at: now + Duration::minutes(i64::from(ttl.unwrap_or_default())),
        }))
    }

    /// Releases the recorded hold.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `hold_id` is not the recorded hold.
    pub fn release_hold(
        &self,
        hold_id: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<AppointmentSlotEvent, DomainError> {
        self.require_hold(hold_id)?;
        Ok(AppointmentSlotEvent::SlotHoldReleased(SlotHoldReleased {
            hold_id,
            slot_id: self.id,
            reason: reason.unwrap_or_else(|| "released".into()),
            released_at: now,
        }))
    }

    /// Expires the recorded hold once its time has passed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `hold_id` is not the recorded hold
    /// or it has not expired yet.
    pub fn expire_hold(&self, hold_id: Uuid, now: DateTime<Utc>) -> Result<AppointmentSlotEvent, DomainError> {
        let hold = self.require_hold(hold_id)?;
        if hold.is_live(now) {
            return Err(DomainError::invalid("hold_id", "hold has not expired"));
        }
        Ok(AppointmentSlotEvent::SlotHoldExpired(SlotHoldExpired {
            hold_id,
            slot_id: self.id,
            expired_at: now,
        }))
    }

    fn require_hold(&self, hold_id: Uuid) -> Result<&ActiveHold, DomainError> {
        self.active_hold
            .as_ref()
            .filter(|h| h.hold_id == hold_id)
            .ok_or_else(|| DomainError::invalid("hold_id", "no such active hold on this slot"))
    }

    /// Takes one place for an appointment.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` listing every reason the booking is
    /// refused.
    pub fn book(
        &self,
        planned: &GeneratedSlot,
        appointment_id: Uuid,
        patient_id: Uuid,
        mode: ConsultationMode,
        hold_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<AppointmentSlotEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        match self.status(planned) {
            SlotStatus::Available => {}
            other => errors.push("slot_id", format!("slot is {}", other.as_str())),
        }
        errors.check(planned.starts_at() > now, "slot_id", "slot has already started");
        errors.check(
            planned.consultation_mode.accepts(mode),
            "consultation_mode",
            "not offered by this slot",
        );
        let released_hold_id = match (self.live_hold(now), hold_id) {
            (None, _) => None,
            (Some(live), Some(own)) if live.hold_id == own => Some(own),
            (Some(_), _) => {
                errors.push("slot_id", "slot is held by another booking");
                None
            }
        };
        errors.into_result()?;

        let mut after = self.clone();
        after.count(mode, 1);
        Ok(AppointmentSlotEvent::SlotBooked(SlotBooked {
            slot_id: self.id,
            appointment_id,
            patient_id,
            consultation_mode: mode,
            released_hold_id,
            occupancy: after.occupancy(planned),
            booked_at: now,
        }))
    }

    /// Returns a cancelled appointment's place.
    #[must_use]
    pub fn cancel_booking(
        &self,
        planned: &GeneratedSlot,
        appointment_id: Uuid,
        mode: ConsultationMode,
        now: DateTime<Utc>,
    ) -> AppointmentSlotEvent {
        let mut after = self.clone();
        after.count(mode, -1);
        AppointmentSlotEvent::SlotBookingCancelled(SlotBookingCancelled {
            slot_id: self.id,
            appointment_id,
            consultation_mode: mode,
            occupancy: after.occupancy(planned),
            cancelled_at: now,
        })
    }

    /// Closes the slot to new bookings.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the slot is withdrawn or already
    /// blocked.
    pub fn block(&self, reason: Option<String>, now: DateTime<Utc>) -> Result<AppointmentSlotEvent, DomainError> {
        if self.withdrawn || self.blocked {
            return Err(DomainError::invalid("slot_id", "slot is not open"));
        }
        Ok(AppointmentSlotEvent::SlotBlocked(SlotStatusChanged {
            slot_id: self.id,
            status: SlotStatus::Blocked,
            reason,
            changed_at: now,
        }))
    }

    /// Reopens a blocked slot.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless the slot is blocked.
    pub fn unblock(
        &self,
        planned: &GeneratedSlot,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<AppointmentSlotEvent, DomainError> {
        if self.withdrawn || !self.blocked {
            return Err(DomainError::invalid("slot_id", "slot is not blocked"));
        }
        let reopened = Self {
            blocked: false,
            ..self.clone()
        };
        Ok(AppointmentSlotEvent::SlotUnblocked(SlotStatusChanged {
            slot_id: self.id,
            status: reopened.status(planned),
            reason,
            changed_at: now,
        }))
    }

    /// Retires a future slot nobody has booked or holds.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the slot is withdrawn, booked,
    /// held or has started.
    pub fn withdraw(&self, planned: &GeneratedSlot, now: DateTime<Utc>) -> Result<AppointmentSlotEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        errors.check(!self.withdrawn, "slot_id", "slot is already withdrawn");
        errors.check(self.current_bookings == 0, "slot_id", "slot has bookings");
        errors.check(self.live_hold(now).is_none(), "slot_id", "slot has an active hold");
        errors.check(planned.starts_at() > now, "slot_id", "slot has already started");
        errors.into_result()?;

        Ok(AppointmentSlotEvent::SlotWithdrawn(SlotStatusChanged {
            slot_id: self.id,
            status: SlotStatus::Withdrawn,
            reason: Some("regenerated".into()),
            changed_at: now,
        }))
    }

    fn count(&mut self, mode: ConsultationMode, delta: i32) {
        let bump = |n: &mut u32| *n = n.saturating_add_signed(delta);
        bump(&mut self.current_bookings);
        match mode {
            ConsultationMode::InPerson => bump(&mut self.in_person_bookings),
            ConsultationMode::Virtual => bump(&mut self.virtual_bookings),
            ConsultationMode::Hybrid => {}
        }
    }
}

impl AggregateRoot for AppointmentSlot {
    type Event = AppointmentSlotEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            ..Self::default()
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &AppointmentSlotEvent) {
        match event {
            AppointmentSlotEvent::SlotHoldPlaced(e) => {
                self.active_hold = Some(ActiveHold {
                    hold_id: e.hold_id,
                    holder_id: e.holder_id,
                    expires_at: e.expires_at,
                });
            }
            AppointmentSlotEvent::SlotHoldReleased(SlotHoldReleased { hold_id, .. })
            | AppointmentSlotEvent::SlotHoldExpired(SlotHoldExpired { hold_id, .. }) => {
                if self.active_hold.as_ref().is_some_and(|h| h.hold_id == *hold_id) {
                    self.active_hold = None;
                }
            }
            AppointmentSlotEvent::SlotBooked(e) => {
                self.set_occupancy(&e.occupancy);
                if e.released_hold_id.is_some() {
                    self.active_hold = None;
                }
            }
            AppointmentSlotEvent::SlotBookingCancelled(e) => self.set_occupancy(&e.occupancy),
            AppointmentSlotEvent::SlotBlocked(_) => self.blocked = true,
            AppointmentSlotEvent::SlotUnblocked(_) => self.blocked = false,
            AppointmentSlotEvent::SlotWithdrawn(_) => self.withdrawn = true,
        }
        self.version += 1;
    }
}

impl AppointmentSlot {
    fn set_occupancy(&mut self, occupancy: &SlotOccupancy) {
        self.current_bookings = occupancy.current_bookings;
        self.in_person_bookings = occupancy.in_person_bookings;
        self.virtual_bookings = occupancy.virtual_bookings;
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    use super::*;
    use crate::domain::slot_planning::{HoldType, ScheduleSource};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn planned_slot(mode: ConsultationMode, capacity: u32) -> GeneratedSlot {
        GeneratedSlot {
            slot_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 1, 20).unwrap(),
            start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            duration_minutes: 30,
            consultation_mode: mode,
            max_capacity: capacity,
            location_id: None,
            schedule_source: ScheduleSource::BaseSchedule,
        }
    }

    fn hold_command(holder_id: Uuid) -> PlaceHold {
        PlaceHold {
            hold_id: None,
            generation_run_id: Uuid::new_v4(),
            holder_id,
            patient_id: None,
            hold_type: HoldType::PatientBooking,
            ttl_minutes: None,
        }
    }

    #[test]
    fn test_second_hold_is_rejected_until_first_expires() {
        // Arrange
        let planned = planned_slot(ConsultationMode::InPerson, 1);
        let mut slot = AppointmentSlot::new(planned.slot_id);
        let first = slot
            .place_hold(&planned, Uuid::new_v4(), &hold_command(Uuid::new_v4()), now())
            .unwrap();
        slot.apply(&first);

        // Act
        let blocked = slot.place_hold(&planned, Uuid::new_v4(), &hold_command(Uuid::new_v4()), now());
        let later = now() + Duration::minutes(11);
        let lapsed = slot.lapse_expired(later);
        let retried = slot.place_hold(&planned, Uuid::new_v4(), &hold_command(Uuid::new_v4()), later);

        // Assert
        assert!(matches!(blocked, Err(DomainError::Validation(_))));
        assert!(matches!(lapsed, Some(AppointmentSlotEvent::SlotHoldExpired(_))));
        assert!(retried.is_ok());
    }

    #[test]
    fn test_patient_hold_defaults_to_ten_minutes() {
        let planned = planned_slot(ConsultationMode::InPerson, 1);
        let slot = AppointmentSlot::new(planned.slot_id);

        let event = slot
            .place_hold(&planned, Uuid::new_v4(), &hold_command(Uuid::new_v4()), now())
            .unwrap();

        match event {
            AppointmentSlotEvent::SlotHoldPlaced(e) => {
                assert_eq!(e.expires_at, now() + Duration::minutes(10));
            }
            other => panic!("expected SlotHoldPlaced, got {other:?}"),
        }
    }

    #[test]
    fn test_booking_with_own_hold_releases_it_and_fills_slot() {
        // Arrange
        let planned = planned_slot(ConsultationMode::Hybrid, 1);
        let mut slot = AppointmentSlot::new(planned.slot_id);
        let hold_id = Uuid::new_v4();
        slot.apply(
            &slot
                .place_hold(&planned, hold_id, &hold_command(Uuid::new_v4()), now())
                .unwrap(),
        );

        // Act
        let event = slot
            .book(&planned, Uuid::new_v4(), Uuid::new_v4(), ConsultationMode::Virtual, Some(hold_id), now())
            .unwrap();
        slot.apply(&event);

        // Assert
        assert!(slot.active_hold.is_none());
        assert_eq!(slot.virtual_bookings, 1);
        assert_eq!(slot.status(&planned), SlotStatus::FullyBooked);
    }

    #[test]
    fn test_booking_refuses_foreign_hold_and_wrong_mode() {
        let planned = planned_slot(ConsultationMode::InPerson, 2);
        let mut slot = AppointmentSlot::new(planned.slot_id);
        slot.apply(
            &slot
                .place_hold(&planned, Uuid::new_v4(), &hold_command(Uuid::new_v4()), now())
                .unwrap(),
        );

        let result = slot.book(
            &planned,
            Uuid::new_v4(),
            Uuid::new_v4(),
            ConsultationMode::Virtual,
            Some(Uuid::new_v4()),
            now(),
        );

        match result {
            Err(DomainError::Validation(errors)) => {
                let fields: Vec<&str> = errors.errors().iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["consultation_mode", "slot_id"]);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_cancel_booking_returns_capacity() {
        let planned = planned_slot(ConsultationMode::InPerson, 1);
        let mut slot = AppointmentSlot::new(planned.slot_id);
        let appointment_id = Uuid::new_v4();
        slot.apply(
            &slot
                .book(&planned, appointment_id, Uuid::new_v4(), ConsultationMode::InPerson, None, now())
                .unwrap(),
        );

        slot.apply(&slot.cancel_booking(&planned, appointment_id, ConsultationMode::InPerson, now()));

        assert_eq!(slot.current_bookings, 0);
        assert_eq!(slot.status(&planned), SlotStatus::Available);
    }

    #[test]
    fn test_booked_slot_cannot_be_withdrawn() {
        let planned = planned_slot(ConsultationMode::InPerson, 2);
        let mut slot = AppointmentSlot::new(planned.slot_id);
        slot.apply(
            &slot
                .book(&planned, Uuid::new_v4(), Uuid::new_v4(), ConsultationMode::InPerson, None, now())
                .unwrap(),
        );

        assert!(slot.withdraw(&planned, now()).is_err());
    }

    #[test]
    fn test_blocked_slot_refuses_holds_and_unblocks_to_available() {
        let planned = planned_slot(ConsultationMode::InPerson, 1);
        let mut slot = AppointmentSlot::new(planned.slot_id);
        slot.apply(&slot.block(Some("maintenance".into()), now()).unwrap());

        let hold = slot.place_hold(&planned, Uuid::new_v4(), &hold_command(Uuid::new_v4()), now());
        let reopened = slot.unblock(&planned, None, now()).unwrap();

        assert!(hold.is_err());
        match reopened {
            AppointmentSlotEvent::SlotUnblocked(e) => assert_eq!(e.status, SlotStatus::Available),
            other => panic!("expected SlotUnblocked, got {other:?}"),
        }
    }
}
