//! Scheduling commands run end to end through the command bus.

use std::sync::Arc;

use chrono::Duration;
use clinicops_command_bus::CommandBus;
use clinicops_core::command::{Command, CommandResult};
use clinicops_core::error::DomainError;
use clinicops_core::store::EventStore;
use clinicops_event_store::InMemoryEventStore;
use clinicops_test_support::{MockClock, SnapshotRefusingStore, command, fixed_time};
use serde_json::{Value, json};
use uuid::Uuid;

struct Harness {
    bus: CommandBus,
    store: Arc<InMemoryEventStore>,
    clock: Arc<MockClock>,
}

impl Harness {
    fn new() -> Self {
        let clock = Arc::new(MockClock::new(fixed_time()));
        let store = Arc::new(InMemoryEventStore::new(clock.clone()));
        let bus = Self::bus_over(store.clone(), clock.clone());
        Self { bus, store, clock }
    }

    /// Same wiring, but every snapshot write the bus attempts fails.
    fn refusing_snapshots() -> Self {
        let clock = Arc::new(MockClock::new(fixed_time()));
        let store = Arc::new(InMemoryEventStore::new(clock.clone()));
        let bus = Self::bus_over(Arc::new(SnapshotRefusingStore::new(store.clone())), clock.clone());
        Self { bus, store, clock }
    }

    fn bus_over(store: Arc<dyn EventStore>, clock: Arc<MockClock>) -> CommandBus {
        CommandBus::builder(store, clock)
            .register_all(clinicops_clinical::application::command_handlers::command_handlers())
            .register_all(clinicops_scheduling::application::command_handlers::command_handlers())
            .build()
            .unwrap()
    }

    async fn send(&self, command: Command) -> Result<CommandResult, DomainError> {
        self.bus.handle(command).await
    }

    async fn patient(&self) -> Uuid {
        self.send(command(
            "register_patient",
            json!({
                "mrn": "MRN-2026-000123",
                "first_name": "Ada",
                "last_name": "Lovelace",
                "date_of_birth": "1985-12-10",
            }),
        ))
        .await
        .unwrap()
        .aggregate_id
    }

    async fn bookable_doctor(&self) -> Uuid {
        let doctor_id = self
            .send(command(
                "create_doctor_profile",
                json!({
                    "hospital_id": Uuid::new_v4(),
                    "full_name": "Dr. Grace Hopper",
                    "specialty": "cardiology",
                }),
            ))
            .await
            .unwrap()
            .aggregate_id;
        self.send(command("activate_doctor_profile", json!({})).for_aggregate(doctor_id))
            .await
            .unwrap();
        doctor_id
    }

    /// Generates one in-person slot on 2026-02-02 09:00 and returns
    /// `(run_id, slot_id)`.
    async fn single_slot(&self, doctor_id: Uuid, capacity: u32) -> (Uuid, Uuid) {
        let slot_id = Uuid::new_v4();
        let result = self
            .send(command(
                "generate_slots",
                json!({
                    "doctor_id": doctor_id,
                    "from_date": "2026-02-02",
                    "to_date": "2026-02-02",
                    "slots": [{
                        "slot_id": slot_id,
                        "date": "2026-02-02",
                        "start_time": "09:00:00",
                        "end_time": "09:30:00",
                        "duration_minutes": 30,
                        "consultation_mode": "in_person",
                        "max_capacity": capacity,
                        "schedule_source": "base_schedule",
                    }],
                }),
            ))
            .await
            .unwrap();
        (result.aggregate_id, slot_id)
    }

    async fn hold(&self, run_id: Uuid, slot_id: Uuid) -> Result<CommandResult, DomainError> {
        self.send(
            command(
                "place_hold",
                json!({
                    "generation_run_id": run_id,
                    "holder_id": Uuid::new_v4(),
                    "hold_type": "patient_booking",
                }),
            )
            .for_aggregate(slot_id),
        )
        .await
    }
}

fn event_types(result: &CommandResult) -> Vec<&str> {
    result.events.iter().map(|e| e.event_type.as_str()).collect()
}

fn fields(error: &DomainError) -> Vec<&str> {
    match error {
        DomainError::Validation(errors) => errors.errors().iter().map(|e| e.field.as_str()).collect(),
        other => panic!("expected Validation, got {other:?}"),
    }
}

#[tokio::test]
async fn test_generation_rejects_unbookable_doctor() {
    // Arrange
    let harness = Harness::new();
    let doctor_id = harness
        .send(command(
            "create_doctor_profile",
            json!({
                "hospital_id": Uuid::new_v4(),
                "full_name": "Dr. Draft",
                "specialty": "oncology",
            }),
        ))
        .await
        .unwrap()
        .aggregate_id;

    // Act
    let result = harness
        .send(command(
            "generate_slots",
            json!({
                "doctor_id": doctor_id,
                "from_date": "2026-02-02",
                "to_date": "2026-02-01",
                "slots": [],
            }),
        ))
        .await;

    // Assert
    let error = result.unwrap_err();
    assert_eq!(fields(&error), vec!["end_date", "doctor_id", "slots"]);
}

#[tokio::test]
async fn test_second_hold_waits_for_first_to_expire() {
    // Arrange
    let harness = Harness::new();
    let doctor_id = harness.bookable_doctor().await;
    let (run_id, slot_id) = harness.single_slot(doctor_id, 1).await;
    let first = harness.hold(run_id, slot_id).await.unwrap();

    // Act
    let rejected = harness.hold(run_id, slot_id).await;
    harness.clock.advance(Duration::minutes(11));
    let accepted = harness.hold(run_id, slot_id).await.unwrap();

    // Assert
    assert_eq!(event_types(&first), vec!["slot_hold_placed"]);
    assert_eq!(fields(&rejected.unwrap_err()), vec!["slot_id"]);
    assert_eq!(
        event_types(&accepted),
        vec!["slot_hold_expired", "slot_hold_placed"]
    );
    assert_eq!(accepted.aggregate_version, 3);
}

#[tokio::test]
async fn test_hold_commands_survive_a_failed_snapshot_write() {
    // Arrange
    let harness = Harness::refusing_snapshots();
    let doctor_id = harness.bookable_doctor().await;
    let (run_id, slot_id) = harness.single_slot(doctor_id, 1).await;

    // Act
    let mut last_version = 0;
    for _ in 0..30 {
        let held = harness.hold(run_id, slot_id).await.unwrap();
        let hold_id = held.events[0].payload["hold_id"].clone();
        let released = harness
            .send(
                command(
                    "release_hold",
                    json!({ "hold_id": hold_id, "generation_run_id": run_id }),
                )
                .for_aggregate(slot_id),
            )
            .await
            .unwrap();
        last_version = released.aggregate_version;
    }

    // Assert
    assert_eq!(last_version, 60);
    let (snapshot, events) = harness.store.get_aggregate_with_snapshot(slot_id).await.unwrap();
    assert!(snapshot.is_none());
    assert_eq!(events.len(), 60);
}

#[tokio::test]
async fn test_booking_with_own_hold_fills_slot_and_cancel_frees_it() {
    // Arrange
    let harness = Harness::new();
    let patient_id = harness.patient().await;
    let doctor_id = harness.bookable_doctor().await;
    let (run_id, slot_id) = harness.single_slot(doctor_id, 1).await;
    let held = harness.hold(run_id, slot_id).await.unwrap();
    let hold_id: Uuid =
        serde_json::from_value(held.events[0].payload["hold_id"].clone()).unwrap();
    let booking = |hold: Value| {
        command(
            "book_appointment",
            json!({
                "slot_id": slot_id,
                "generation_run_id": run_id,
                "patient_id": patient_id,
                "consultation_mode": "in_person",
                "hold_id": hold,
            }),
        )
    };

    // Act
    let booked = harness.send(booking(json!(hold_id))).await.unwrap();
    let full = harness.send(booking(Value::Null)).await;
    let cancelled = harness
        .send(
            command("cancel_appointment", json!({ "reason": "patient request" }))
                .for_aggregate(booked.aggregate_id),
        )
        .await
        .unwrap();
    let rebooked = harness.send(booking(Value::Null)).await.unwrap();

    // Assert
    assert_eq!(event_types(&booked), vec!["appointment_booked", "slot_booked"]);
    assert_eq!(fields(&full.unwrap_err()), vec!["slot_id"]);
    assert_eq!(
        event_types(&cancelled),
        vec!["appointment_cancelled", "slot_booking_cancelled"]
    );
    assert_eq!(event_types(&rebooked), vec!["appointment_booked", "slot_booked"]);
    let slot_versions: Vec<i64> = harness
        .store
        .get_aggregate_events(slot_id, 0)
        .await
        .unwrap()
        .iter()
        .map(|e| e.aggregate_version)
        .collect();
    assert_eq!(slot_versions, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_booking_requires_existing_patient() {
    // Arrange
    let harness = Harness::new();
    let doctor_id = harness.bookable_doctor().await;
    let (run_id, slot_id) = harness.single_slot(doctor_id, 1).await;

    // Act
    let result = harness
        .send(command(
            "book_appointment",
            json!({
                "slot_id": slot_id,
                "generation_run_id": run_id,
                "patient_id": Uuid::new_v4(),
                "consultation_mode": "in_person",
            }),
        ))
        .await;

    // Assert
    assert_eq!(fields(&result.unwrap_err()), vec!["patient_id"]);
    assert!(
        harness
            .store
            .get_aggregate_events(slot_id, 0)
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_regenerate_withdraws_at_expected_version_only() {
    // Arrange
    let harness = Harness::new();
    let doctor_id = harness.bookable_doctor().await;
    let (run_id, slot_id) = harness.single_slot(doctor_id, 1).await;
    let regenerate = |expected_version: i64| {
        command(
            "regenerate_slots",
            json!({
                "doctor_id": doctor_id,
                "from_date": "2026-02-02",
                "to_date": "2026-02-02",
                "slots": [],
                "withdrawals": [{
                    "slot_id": slot_id,
                    "generation_run_id": run_id,
                    "expected_version": expected_version,
                }],
            }),
        )
    };

    // Act
    let stale = harness.send(regenerate(3)).await;
    let withdrawn = harness.send(regenerate(0)).await.unwrap();

    // Assert
    match stale {
        Err(DomainError::ConcurrencyConflict {
            aggregate_id,
            expected,
            actual,
        }) => {
            assert_eq!(aggregate_id, slot_id);
            assert_eq!(expected, 3);
            assert_eq!(actual, 0);
        }
        other => panic!("expected ConcurrencyConflict, got {other:?}"),
    }
    assert_eq!(event_types(&withdrawn), vec!["slot_withdrawn"]);
    assert!(harness.hold(run_id, slot_id).await.is_err());
}
