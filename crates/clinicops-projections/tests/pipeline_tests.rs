//! Commands through the bus, events through the worker, rows in the read
//! models.

use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use clinicops_clinical::application::query_handlers::{find_patient_by_mrn, get_visit};
use clinicops_command_bus::CommandBus;
use clinicops_core::command::{Command, CommandResult};
use clinicops_core::error::DomainError;
use clinicops_core::read_model::{ReadModelStore, ReadModelTable};
use clinicops_core::store::EventStore;
use clinicops_event_store::{InMemoryEventStore, InMemoryReadModelStore};
use clinicops_projections::{ProjectionDispatcher, ProjectionWorker, WorkerConfig, default_handlers};
use clinicops_scheduling::application::holds::{HoldEngine, HoldRequest};
use clinicops_scheduling::application::query_handlers::{get_slot, list_slots_for_doctor};
use clinicops_scheduling::application::slot_generation::SlotGenerationEngine;
use clinicops_scheduling::domain::read_models::{HoldStatus, TentativeHoldRow};
use clinicops_scheduling::domain::slot_planning::{HoldType, ScheduleSource};
use clinicops_test_support::{MockClock, command, fixed_time, metadata, test_tenant};
use serde_json::json;
use uuid::Uuid;

struct Pipeline {
    bus: Arc<CommandBus>,
    store: Arc<InMemoryEventStore>,
    read_models: Arc<InMemoryReadModelStore>,
    clock: Arc<MockClock>,
    worker: ProjectionWorker,
}

impl Pipeline {
    fn new() -> Self {
        let clock = Arc::new(MockClock::new(fixed_time()));
        let store = Arc::new(InMemoryEventStore::new(clock.clone()));
        let read_models = Arc::new(InMemoryReadModelStore::new());
        let bus = CommandBus::builder(store.clone(), clock.clone())
            .register_all(clinicops_clinical::application::command_handlers::command_handlers())
            .register_all(clinicops_scheduling::application::command_handlers::command_handlers())
            .build()
            .unwrap();
        let dispatcher = ProjectionDispatcher::new(
            store.clone(),
            read_models.clone(),
            clock.clone(),
            default_handlers(),
        );
        let worker = ProjectionWorker::new(
            store.clone(),
            Arc::new(dispatcher),
            WorkerConfig {
                batch_size: 25,
                ..WorkerConfig::default()
            },
        );
        Self {
            bus: Arc::new(bus),
            store,
            read_models,
            clock,
            worker,
        }
    }

    async fn send(&self, command: Command) -> Result<CommandResult, DomainError> {
        self.bus.handle(command).await
    }

    /// Runs the worker until the log is fully projected.
    async fn drain(&self) {
        while self.worker.run_once().await.unwrap() > 0 {}
    }

    fn slots(&self) -> SlotGenerationEngine {
        SlotGenerationEngine::new(self.bus.clone(), self.read_models.clone())
    }

    fn holds(&self) -> HoldEngine {
        HoldEngine::new(self.bus.clone(), self.read_models.clone())
    }

    /// An active, bookable doctor working Mondays 09:00 to 17:00 in 30
    /// minute slots. Returns `(doctor_id, hospital_id)`.
    async fn monday_doctor(&self) -> (Uuid, Uuid) {
        let hospital_id = Uuid::new_v4();
        let doctor_id = self
            .send(command(
                "create_doctor_profile",
                json!({
                    "hospital_id": hospital_id,
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
        self.send(command(
            "create_doctor_schedule",
            json!({
                "doctor_id": doctor_id,
                "day_of_week": "monday",
                "start_time": "09:00:00",
                "end_time": "17:00:00",
                "slot_duration_minutes": 30,
                "consultation_mode": "in_person",
                "max_capacity": 1,
                "effective_from": "2026-01-01",
            }),
        ))
        .await
        .unwrap();
        self.drain().await;
        (doctor_id, hospital_id)
    }
}

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 2, day).unwrap()
}

#[tokio::test]
async fn test_completed_visit_is_projected_with_diagnosis() {
    // Arrange
    let pipeline = Pipeline::new();
    let patient_id = pipeline
        .send(command(
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
        .aggregate_id;
    let visit_id = pipeline
        .send(command(
            "schedule_visit",
            json!({
                "patient_id": patient_id,
                "scheduled_at": "2026-01-20T09:00:00Z",
                "reason": "Chest pain follow-up",
            }),
        ))
        .await
        .unwrap()
        .aggregate_id;

    // Act
    let completed = pipeline
        .send(
            command("complete_visit", json!({ "diagnosis": "Stable angina" }))
                .for_aggregate(visit_id),
        )
        .await
        .unwrap();
    pipeline.drain().await;

    // Assert
    assert_eq!(completed.aggregate_version, 2);
    let log = pipeline.store.get_aggregate_events(visit_id, 0).await.unwrap();
    let history: Vec<(&str, i64)> = log
        .iter()
        .map(|e| (e.event_type.as_str(), e.aggregate_version))
        .collect();
    assert_eq!(history, vec![("visit_scheduled", 1), ("visit_completed", 2)]);

    let patient = find_patient_by_mrn(pipeline.read_models.as_ref(), test_tenant(), "MRN-2026-000123")
        .await
        .unwrap();
    assert_eq!(patient.row.patient_id, patient_id);
    let visit = get_visit(pipeline.read_models.as_ref(), test_tenant(), visit_id)
        .await
        .unwrap();
    assert_eq!(visit.version, 2);
    assert_eq!(visit.row.diagnosis.as_deref(), Some("Stable angina"));
}

#[tokio::test]
async fn test_monday_schedule_generates_sixteen_slots() {
    // Arrange
    let pipeline = Pipeline::new();
    let (doctor_id, _) = pipeline.monday_doctor().await;

    // Act
    let generated = pipeline
        .slots()
        .generate_slots_for_doctor(test_tenant(), doctor_id, date(2), date(2))
        .await
        .unwrap();
    pipeline.drain().await;
    let again = pipeline
        .slots()
        .generate_slots_for_doctor(test_tenant(), doctor_id, date(2), date(2))
        .await
        .unwrap();

    // Assert
    assert_eq!(generated, 16);
    assert_eq!(again, 0);
    let slots = list_slots_for_doctor(pipeline.read_models.as_ref(), test_tenant(), doctor_id, date(2), date(2))
        .await
        .unwrap();
    assert_eq!(slots.len(), 16);
    assert_eq!(slots[0].row.start_time.to_string(), "09:00:00");
    assert_eq!(slots[15].row.end_time.to_string(), "17:00:00");
    assert!(slots.iter().all(|s| s.version == 0));
}

#[tokio::test]
async fn test_generation_resolves_each_day_by_source_priority() {
    // Arrange
    let pipeline = Pipeline::new();
    let (doctor_id, hospital_id) = pipeline.monday_doctor().await;
    pipeline
        .send(command(
            "create_schedule_override",
            json!({
                "doctor_id": doctor_id,
                "date": "2026-02-04",
                "is_available": true,
                "window": {
                    "start_time": "10:00:00",
                    "end_time": "12:00:00",
                    "slot_duration_minutes": 30,
                    "consultation_mode": "virtual",
                    "max_capacity": 2,
                },
            }),
        ))
        .await
        .unwrap();
    pipeline
        .send(command(
            "declare_holiday",
            json!({
                "hospital_id": hospital_id,
                "date": "2026-02-09",
                "name": "Founders' Day",
            }),
        ))
        .await
        .unwrap();
    pipeline.drain().await;

    // Act
    let generated = pipeline
        .slots()
        .generate_slots_for_doctor(test_tenant(), doctor_id, date(2), date(9))
        .await
        .unwrap();
    pipeline.drain().await;

    // Assert
    assert_eq!(generated, 20);
    let slots = list_slots_for_doctor(pipeline.read_models.as_ref(), test_tenant(), doctor_id, date(2), date(9))
        .await
        .unwrap();
    let on = |day: u32| slots.iter().filter(move |s| s.row.date == date(day));
    assert_eq!(on(2).count(), 16);
    assert!(on(2).all(|s| s.row.schedule_source == ScheduleSource::BaseSchedule));
    assert_eq!(on(4).count(), 4);
    assert!(on(4).all(|s| s.row.schedule_source == ScheduleSource::Override && s.row.max_capacity == 2));
    assert_eq!(on(9).count(), 0);
}

#[tokio::test]
async fn test_hold_excludes_others_until_swept_after_expiry() {
    // Arrange
    let pipeline = Pipeline::new();
    let (doctor_id, _) = pipeline.monday_doctor().await;
    pipeline
        .slots()
        .generate_slots_for_doctor(test_tenant(), doctor_id, date(2), date(2))
        .await
        .unwrap();
    pipeline.drain().await;
    let slot_id = list_slots_for_doctor(pipeline.read_models.as_ref(), test_tenant(), doctor_id, date(2), date(2))
        .await
        .unwrap()[0]
        .row
        .slot_id;
    let holds = pipeline.holds();
    let request = || HoldRequest {
        holder_id: Uuid::new_v4(),
        patient_id: None,
        hold_type: HoldType::PatientBooking,
        ttl_minutes: None,
    };

    // Act
    let first = holds
        .place_hold(test_tenant(), slot_id, request(), metadata())
        .await
        .unwrap();
    pipeline.drain().await;
    let available_while_held = holds.is_slot_available(test_tenant(), slot_id).await.unwrap();
    let rival = holds.place_hold(test_tenant(), slot_id, request(), metadata()).await;
    pipeline.clock.advance(Duration::minutes(11));
    let swept = holds.sweep_expired_holds(100).await.unwrap();
    pipeline.drain().await;
    let available_after_sweep = holds.is_slot_available(test_tenant(), slot_id).await.unwrap();
    let second = holds
        .place_hold(test_tenant(), slot_id, request(), metadata())
        .await
        .unwrap();
    pipeline.drain().await;

    // Assert
    assert!(!available_while_held);
    match rival {
        Err(DomainError::Validation(errors)) => {
            assert_eq!(errors.errors()[0].field, "slot_id");
        }
        other => panic!("expected Validation, got {other:?}"),
    }
    assert_eq!(swept, 1);
    assert!(available_after_sweep);

    let expired = pipeline
        .read_models
        .get(ReadModelTable::TentativeHolds, first.hold_id)
        .await
        .unwrap()
        .unwrap()
        .decode::<TentativeHoldRow>()
        .unwrap();
    assert_eq!(expired.status, HoldStatus::Expired);
    assert_eq!(second.result.aggregate_version, 3);
    let slot = get_slot(pipeline.read_models.as_ref(), test_tenant(), slot_id)
        .await
        .unwrap();
    assert_eq!(slot.version, 3);
}

#[tokio::test]
async fn test_sweep_moves_past_hold_rows_the_slot_no_longer_records() {
    // Arrange
    let pipeline = Pipeline::new();
    let (doctor_id, _) = pipeline.monday_doctor().await;
    pipeline
        .slots()
        .generate_slots_for_doctor(test_tenant(), doctor_id, date(2), date(2))
        .await
        .unwrap();
    pipeline.drain().await;
    let slots = list_slots_for_doctor(pipeline.read_models.as_ref(), test_tenant(), doctor_id, date(2), date(2))
        .await
        .unwrap();
    let (stale_slot, live_slot) = (slots[0].row.slot_id, slots[1].row.slot_id);
    let holds = pipeline.holds();
    let request = || HoldRequest {
        holder_id: Uuid::new_v4(),
        patient_id: None,
        hold_type: HoldType::PatientBooking,
        ttl_minutes: None,
    };
    let stale = holds
        .place_hold(test_tenant(), stale_slot, request(), metadata())
        .await
        .unwrap();
    pipeline.drain().await;
    // The release is recorded but its projection never lands, so the row
    // still reads active.
    let released = holds
        .release_hold(test_tenant(), stale_slot, stale.hold_id, None, metadata())
        .await
        .unwrap();
    let release_sequence = released.events.last().map(|e| e.sequence).unwrap();
    pipeline
        .store
        .mark_events_processed("main", release_sequence)
        .await
        .unwrap();
    pipeline.clock.advance(Duration::minutes(1));
    let live = holds
        .place_hold(test_tenant(), live_slot, request(), metadata())
        .await
        .unwrap();
    pipeline.drain().await;
    pipeline.clock.advance(Duration::minutes(40));

    // Act
    let mut swept = Vec::new();
    for _ in 0..3 {
        swept.push(holds.sweep_expired_holds(1).await.unwrap());
        pipeline.drain().await;
    }

    // Assert
    assert_eq!(swept, vec![1, 0, 0]);
    let mut statuses = Vec::new();
    for hold_id in [live.hold_id, stale.hold_id] {
        let row = pipeline
            .read_models
            .get(ReadModelTable::TentativeHolds, hold_id)
            .await
            .unwrap()
            .unwrap();
        statuses.push(row.decode::<TentativeHoldRow>().unwrap().status);
    }
    assert_eq!(statuses, vec![HoldStatus::Expired, HoldStatus::Active]);
}

#[tokio::test]
async fn test_checkpoint_reaches_log_head_and_stays_there() {
    // Arrange
    let pipeline = Pipeline::new();
    pipeline.monday_doctor().await;
    let head = pipeline
        .store
        .get_projection_catchup_events("audit", 1_000)
        .await
        .unwrap()
        .last()
        .map(|e| e.sequence)
        .unwrap();

    // Act
    let idle = pipeline.worker.run_once().await.unwrap();

    // Assert
    assert_eq!(idle, 0);
    let checkpoint = pipeline.store.get_projection_checkpoint("main").await.unwrap();
    assert_eq!(checkpoint.last_sequence, head);
    pipeline.store.mark_events_processed("main", 1).await.unwrap();
    let after_rewind = pipeline.store.get_projection_checkpoint("main").await.unwrap();
    assert_eq!(after_rewind.last_sequence, head);
    assert!(pipeline.store.list_projection_errors(10).await.unwrap().is_empty());
}
