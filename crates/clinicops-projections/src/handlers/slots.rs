//! `appointment_slots` table.
//!
//! Slot rows track the version of their own slot stream, not the generation
//! run that created them. A fresh slot is inserted at version 0 and every
//! slot event advances it, so the row version can be handed back as an
//! expected version when the slot is later withdrawn.

use clinicops_core::event::Event;
use clinicops_core::read_model::{ReadModelTable, ReadModelWrite};
use clinicops_scheduling::domain::aggregates::SlotStatus;
use clinicops_scheduling::domain::events::{
    AppointmentSlotEvent, SLOT_BLOCKED_EVENT_TYPE, SLOT_BOOKED_EVENT_TYPE,
    SLOT_BOOKING_CANCELLED_EVENT_TYPE, SLOT_HOLD_EXPIRED_EVENT_TYPE, SLOT_HOLD_PLACED_EVENT_TYPE,
    SLOT_HOLD_RELEASED_EVENT_TYPE, SLOT_UNBLOCKED_EVENT_TYPE, SLOT_WITHDRAWN_EVENT_TYPE,
    SLOTS_GENERATED_EVENT_TYPE, SlotGenerationEvent, SlotStatusChanged,
};
use clinicops_scheduling::domain::read_models::AppointmentSlotRow;

use crate::error::ProjectionError;
use crate::handler::{ProjectionHandler, StatusChange, decode, insert_at, patch, touch};

const TABLE: ReadModelTable = ReadModelTable::AppointmentSlots;

/// Maintains `appointment_slots`.
pub struct AppointmentSlotProjection;

impl AppointmentSlotProjection {
    fn generated(event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let SlotGenerationEvent::SlotsGenerated(run) = decode::<SlotGenerationEvent>(event)?;
        run.slots
            .into_iter()
            .map(|slot| {
                insert_at(
                    TABLE,
                    event,
                    slot.slot_id,
                    0,
                    &AppointmentSlotRow {
                        slot_id: slot.slot_id,
                        generation_run_id: event.aggregate_id,
                        doctor_id: run.doctor_id,
                        location_id: slot.location_id,
                        date: slot.date,
                        start_time: slot.start_time,
                        end_time: slot.end_time,
                        duration_minutes: slot.duration_minutes,
                        consultation_mode: slot.consultation_mode,
                        max_capacity: slot.max_capacity,
                        current_bookings: 0,
                        in_person_bookings: 0,
                        virtual_bookings: 0,
                        status: SlotStatus::Available,
                        schedule_source: slot.schedule_source,
                    },
                )
            })
            .collect()
    }

    fn status(event: &Event, change: &SlotStatusChanged) -> Result<ReadModelWrite, ProjectionError> {
        patch(
            TABLE,
            event,
            change.slot_id,
            &StatusChange {
                status: change.status,
            },
        )
    }
}

impl ProjectionHandler for AppointmentSlotProjection {
    fn name(&self) -> &'static str {
        "appointment_slots"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            SLOTS_GENERATED_EVENT_TYPE,
            SLOT_HOLD_PLACED_EVENT_TYPE,
            SLOT_HOLD_RELEASED_EVENT_TYPE,
            SLOT_HOLD_EXPIRED_EVENT_TYPE,
            SLOT_BOOKED_EVENT_TYPE,
            SLOT_BOOKING_CANCELLED_EVENT_TYPE,
            SLOT_BLOCKED_EVENT_TYPE,
            SLOT_UNBLOCKED_EVENT_TYPE,
            SLOT_WITHDRAWN_EVENT_TYPE,
        ]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        if event.event_type == SLOTS_GENERATED_EVENT_TYPE {
            return Self::generated(event);
        }
        let write = match decode::<AppointmentSlotEvent>(event)? {
            // Holds live in their own table; the slot row only follows the version.
            AppointmentSlotEvent::SlotHoldPlaced(h) => touch(TABLE, event, h.slot_id),
            AppointmentSlotEvent::SlotHoldReleased(h) => touch(TABLE, event, h.slot_id),
            AppointmentSlotEvent::SlotHoldExpired(h) => touch(TABLE, event, h.slot_id),
            AppointmentSlotEvent::SlotBooked(b) => patch(TABLE, event, b.slot_id, &b.occupancy)?,
            AppointmentSlotEvent::SlotBookingCancelled(c) => {
                patch(TABLE, event, c.slot_id, &c.occupancy)?
            }
            AppointmentSlotEvent::SlotBlocked(c)
            | AppointmentSlotEvent::SlotUnblocked(c)
            | AppointmentSlotEvent::SlotWithdrawn(c) => Self::status(event, &c)?,
        };
        Ok(vec![write])
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
    use clinicops_core::event::{DomainEvent, EventMetadata};
    use clinicops_scheduling::domain::events::{
        GeneratedSlot, SlotBooked, SlotHoldPlaced, SlotOccupancy, SlotsGenerated,
    };
    use clinicops_scheduling::domain::slot_planning::{ConsultationMode, HoldType, ScheduleSource};
    use clinicops_test_support::test_tenant;
    use uuid::Uuid;

    use super::*;

    fn stored<E: DomainEvent>(aggregate_id: Uuid, version: i64, event: &E) -> Event {
        let (event_type, payload) = event.encode().unwrap();
        let command_id = Uuid::new_v4();
        Event {
            event_id: Uuid::new_v4(),
            sequence: version,
            aggregate_type: E::AGGREGATE_TYPE,
            aggregate_id,
            aggregate_version: version,
            event_type,
            schema_version: 1,
            payload,
            metadata: EventMetadata {
                correlation_id: command_id,
                causation_id: command_id,
                actor_id: None,
                client: None,
                extensions: serde_json::Map::new(),
            },
            tenant_id: test_tenant(),
            idempotency_key: None,
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
        }
    }

    fn generated_slot(hour: u32) -> GeneratedSlot {
        GeneratedSlot {
            slot_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            start_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            end_time: NaiveTime::from_hms_opt(hour, 30, 0).unwrap(),
            duration_minutes: 30,
            consultation_mode: ConsultationMode::InPerson,
            max_capacity: 1,
            location_id: None,
            schedule_source: ScheduleSource::BaseSchedule,
        }
    }

    #[test]
    fn test_slots_generated_inserts_each_slot_at_version_zero() {
        // Arrange
        let run_id = Uuid::new_v4();
        let slots = vec![generated_slot(9), generated_slot(10)];
        let event = stored(
            run_id,
            1,
            &SlotGenerationEvent::SlotsGenerated(SlotsGenerated {
                run_id,
                doctor_id: Uuid::new_v4(),
                from_date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
                to_date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
                slots: slots.clone(),
                generated_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            }),
        );

        // Act
        let writes = AppointmentSlotProjection.project(&event).unwrap();

        // Assert
        assert_eq!(writes.len(), 2);
        for (write, slot) in writes.iter().zip(&slots) {
            match write {
                ReadModelWrite::Insert { row, .. } => {
                    assert_eq!(row.id, slot.slot_id);
                    assert_eq!(row.current_version, 0);
                    assert_eq!(row.data["generation_run_id"], run_id.to_string());
                    assert_eq!(row.data["status"], "available");
                    assert_eq!(row.data["current_bookings"], 0);
                }
                other => panic!("expected insert, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_hold_placed_only_advances_slot_version() {
        // Arrange
        let slot_id = Uuid::new_v4();
        let event = stored(
            slot_id,
            1,
            &AppointmentSlotEvent::SlotHoldPlaced(SlotHoldPlaced {
                hold_id: Uuid::new_v4(),
                slot_id,
                holder_id: Uuid::new_v4(),
                patient_id: None,
                hold_type: HoldType::PatientBooking,
                placed_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
                expires_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 10, 0).unwrap(),
            }),
        );

        // Act
        let writes = AppointmentSlotProjection.project(&event).unwrap();

        // Assert
        match &writes[..] {
            [ReadModelWrite::Patch { id, patch, source, .. }] => {
                assert_eq!(*id, slot_id);
                assert_eq!(source.version, 1);
                assert!(patch.fields().is_empty());
            }
            other => panic!("expected one empty patch, got {other:?}"),
        }
    }

    #[test]
    fn test_slot_booked_patches_occupancy() {
        // Arrange
        let slot_id = Uuid::new_v4();
        let event = stored(
            slot_id,
            2,
            &AppointmentSlotEvent::SlotBooked(SlotBooked {
                slot_id,
                appointment_id: Uuid::new_v4(),
                patient_id: Uuid::new_v4(),
                consultation_mode: ConsultationMode::InPerson,
                released_hold_id: None,
                occupancy: SlotOccupancy {
                    current_bookings: 1,
                    in_person_bookings: 1,
                    virtual_bookings: 0,
                    status: SlotStatus::FullyBooked,
                },
                booked_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap(),
            }),
        );

        // Act
        let writes = AppointmentSlotProjection.project(&event).unwrap();

        // Assert
        match &writes[..] {
            [ReadModelWrite::Patch { patch, source, .. }] => {
                assert_eq!(source.version, 2);
                assert_eq!(patch.fields()["current_bookings"], 1);
                assert_eq!(patch.fields()["status"], "fully_booked");
            }
            other => panic!("expected one patch, got {other:?}"),
        }
    }
}
