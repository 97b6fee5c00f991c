//! `tentative_holds` table, keyed by hold id.

use chrono::{DateTime, Utc};
use clinicops_core::event::{DomainEvent, Event};
use clinicops_core::read_model::{ReadModelTable, ReadModelWrite};
use clinicops_scheduling::domain::events::{
    AppointmentSlotEvent, SLOT_BOOKED_EVENT_TYPE, SLOT_HOLD_EXPIRED_EVENT_TYPE,
    SLOT_HOLD_PLACED_EVENT_TYPE, SLOT_HOLD_RELEASED_EVENT_TYPE,
};
use clinicops_scheduling::domain::read_models::{HoldStatus, TentativeHoldRow};
use serde::Serialize;

use crate::error::ProjectionError;
use crate::handler::{ProjectionHandler, decode, insert, patch};

const TABLE: ReadModelTable = ReadModelTable::TentativeHolds;

/// Release reason recorded when a booking consumes the hold.
pub const BOOKED_RELEASE_REASON: &str = "booked";

#[derive(Serialize)]
struct HoldEnded {
    status: HoldStatus,
    release_reason: Option<String>,
    ended_at: DateTime<Utc>,
}

/// Maintains `tentative_holds`.
pub struct TentativeHoldProjection;

impl ProjectionHandler for TentativeHoldProjection {
    fn name(&self) -> &'static str {
        "tentative_holds"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            SLOT_HOLD_PLACED_EVENT_TYPE,
            SLOT_HOLD_RELEASED_EVENT_TYPE,
            SLOT_HOLD_EXPIRED_EVENT_TYPE,
            SLOT_BOOKED_EVENT_TYPE,
        ]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let write = match decode::<AppointmentSlotEvent>(event)? {
            AppointmentSlotEvent::SlotHoldPlaced(h) => insert(
                TABLE,
                event,
                h.hold_id,
                &TentativeHoldRow {
                    hold_id: h.hold_id,
                    slot_id: h.slot_id,
                    patient_id: h.patient_id,
                    holder_id: h.holder_id,
                    hold_type: h.hold_type,
                    placed_at: h.placed_at,
                    expires_at: h.expires_at,
                    status: HoldStatus::Active,
                    release_reason: None,
                    ended_at: None,
                },
            )?,
            AppointmentSlotEvent::SlotHoldReleased(h) => patch(
                TABLE,
                event,
                h.hold_id,
                &HoldEnded {
                    status: HoldStatus::Released,
                    release_reason: Some(h.reason),
                    ended_at: h.released_at,
                },
            )?,
            AppointmentSlotEvent::SlotHoldExpired(h) => patch(
                TABLE,
                event,
                h.hold_id,
                &HoldEnded {
                    status: HoldStatus::Expired,
                    release_reason: None,
                    ended_at: h.expired_at,
                },
            )?,
            AppointmentSlotEvent::SlotBooked(b) => match b.released_hold_id {
                Some(hold_id) => patch(
                    TABLE,
                    event,
                    hold_id,
                    &HoldEnded {
                        status: HoldStatus::Released,
                        release_reason: Some(BOOKED_RELEASE_REASON.to_owned()),
                        ended_at: b.booked_at,
                    },
                )?,
                None => return Ok(Vec::new()),
            },
            other => {
                return Err(ProjectionError::Unhandled {
                    handler: self.name(),
                    event_type: other.event_type().to_owned(),
                });
            }
        };
        Ok(vec![write])
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use clinicops_core::event::EventMetadata;
    use clinicops_scheduling::domain::aggregates::SlotStatus;
    use clinicops_scheduling::domain::events::{SlotBooked, SlotHoldExpired, SlotOccupancy};
    use clinicops_scheduling::domain::slot_planning::ConsultationMode;
    use clinicops_test_support::test_tenant;
    use uuid::Uuid;

    use super::*;

    fn stored(slot_id: Uuid, version: i64, event: &AppointmentSlotEvent) -> Event {
        let (event_type, payload) = event.encode().unwrap();
        let command_id = Uuid::new_v4();
        Event {
            event_id: Uuid::new_v4(),
            sequence: version,
            aggregate_type: AppointmentSlotEvent::AGGREGATE_TYPE,
            aggregate_id: slot_id,
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

    fn booked(slot_id: Uuid, released_hold_id: Option<Uuid>) -> AppointmentSlotEvent {
        AppointmentSlotEvent::SlotBooked(SlotBooked {
            slot_id,
            appointment_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            consultation_mode: ConsultationMode::InPerson,
            released_hold_id,
            occupancy: SlotOccupancy {
                current_bookings: 1,
                in_person_bookings: 1,
                virtual_bookings: 0,
                status: SlotStatus::FullyBooked,
            },
            booked_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 5, 0).unwrap(),
        })
    }

    #[test]
    fn test_booking_releases_the_consumed_hold() {
        // Arrange
        let slot_id = Uuid::new_v4();
        let hold_id = Uuid::new_v4();
        let event = stored(slot_id, 2, &booked(slot_id, Some(hold_id)));

        // Act
        let writes = TentativeHoldProjection.project(&event).unwrap();

        // Assert
        match &writes[..] {
            [ReadModelWrite::Patch { id, patch, .. }] => {
                assert_eq!(*id, hold_id);
                assert_eq!(patch.fields()["status"], "released");
                assert_eq!(patch.fields()["release_reason"], BOOKED_RELEASE_REASON);
            }
            other => panic!("expected one patch, got {other:?}"),
        }
    }

    #[test]
    fn test_booking_without_hold_writes_nothing() {
        // Arrange
        let slot_id = Uuid::new_v4();
        let event = stored(slot_id, 1, &booked(slot_id, None));

        // Act
        let writes = TentativeHoldProjection.project(&event).unwrap();

        // Assert
        assert!(writes.is_empty());
    }

    #[test]
    fn test_expiry_marks_hold_expired_without_reason() {
        // Arrange
        let slot_id = Uuid::new_v4();
        let hold_id = Uuid::new_v4();
        let event = stored(
            slot_id,
            2,
            &AppointmentSlotEvent::SlotHoldExpired(SlotHoldExpired {
                hold_id,
                slot_id,
                expired_at: Utc.with_ymd_and_hms(2026, 1, 15, 10, 10, 0).unwrap(),
            }),
        );

        // Act
        let writes = TentativeHoldProjection.project(&event).unwrap();

        // Assert
        match &writes[..] {
            [ReadModelWrite::Patch { patch, .. }] => {
                assert_eq!(patch.fields()["status"], "expired");
                assert!(!patch.fields().contains_key("release_reason"));
            }
            other => panic!("expected one patch, got {other:?}"),
        }
    }
}
