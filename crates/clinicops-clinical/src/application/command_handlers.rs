//! Command handlers for the Patients & Visits context.
//!
//! Each handler validates its payload, loads the aggregate it mutates and
//! returns the drafts for the bus to append.

use std::sync::Arc;

use async_trait::async_trait;
use clinicops_core::aggregate::{AggregateRoot, load_aggregate};
use clinicops_core::command::{Command, CommandHandler, HandlerContext};
use clinicops_core::error::{DomainError, ValidationErrors};
use clinicops_core::event::EventDraft;
use uuid::Uuid;

use crate::domain::aggregates::{Patient, Visit};
use crate::domain::commands::{
    CANCEL_VISIT, COMPLETE_VISIT, CancelVisit, CompleteVisit, REGISTER_PATIENT, RegisterPatient,
    SCHEDULE_VISIT, ScheduleVisit, UPDATE_PATIENT, UpdatePatient,
};
use crate::domain::events::{VisitEvent, VisitScheduled};

/// Every handler of this context, for bus registration.
#[must_use]
pub fn command_handlers() -> Vec<Arc<dyn CommandHandler>> {
    vec![
        Arc::new(RegisterPatientHandler),
        Arc::new(UpdatePatientHandler),
        Arc::new(ScheduleVisitHandler),
        Arc::new(CompleteVisitHandler),
        Arc::new(CancelVisitHandler),
    ]
}

/// Picks the id of a new aggregate: payload, then command target, then fresh.
fn new_aggregate_id(from_payload: Option<Uuid>, command: &Command) -> Uuid {
    from_payload
        .or(command.aggregate_id)
        .unwrap_or_else(Uuid::new_v4)
}

/// Handles `register_patient`.
pub struct RegisterPatientHandler;

#[async_trait]
impl CommandHandler for RegisterPatientHandler {
    fn command_type(&self) -> &'static str {
        REGISTER_PATIENT
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: RegisterPatient = command.parse_payload()?;
        let patient_id = new_aggregate_id(payload.patient_id, command);
        let event = Patient::register(patient_id, &payload, ctx.clock.today())?;
        ctx.ensure_new(patient_id).await?;
        Ok(vec![command.draft(patient_id, 1, &event)?])
    }
}

/// Handles `update_patient`.
pub struct UpdatePatientHandler;

#[async_trait]
impl CommandHandler for UpdatePatientHandler {
    fn command_type(&self) -> &'static str {
        UPDATE_PATIENT
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let patient_id = command.require_aggregate_id()?;
        let payload: UpdatePatient = command.parse_payload()?;
        let patient: Patient = load_aggregate(ctx.store, command.tenant_id(), patient_id).await?;
        let event = patient.update(&payload)?;
        Ok(vec![command.draft(patient_id, patient.version() + 1, &event)?])
    }
}

/// Handles `schedule_visit`.
pub struct ScheduleVisitHandler;

#[async_trait]
impl CommandHandler for ScheduleVisitHandler {
    fn command_type(&self) -> &'static str {
        SCHEDULE_VISIT
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: ScheduleVisit = command.parse_payload()?;
        let mut errors = ValidationErrors::new();
        errors.require_text(&payload.reason, "reason");
        let patient = load_aggregate::<Patient>(ctx.store, command.tenant_id(), payload.patient_id).await;
        match patient {
            Ok(_) => {}
            Err(DomainError::AggregateNotFound(_)) => {
                errors.push("patient_id", "patient does not exist");
            }
            Err(e) => return Err(e),
        }
        errors.into_result()?;

        let visit_id = new_aggregate_id(payload.visit_id, command);
        ctx.ensure_new(visit_id).await?;
        let event = VisitEvent::VisitScheduled(VisitScheduled {
            visit_id,
            patient_id: payload.patient_id,
            doctor_id: payload.doctor_id,
            scheduled_at: payload.scheduled_at,
            reason: payload.reason.trim().to_owned(),
        });
        Ok(vec![command.draft(visit_id, 1, &event)?])
    }
}

/// Handles `complete_visit`.
pub struct CompleteVisitHandler;

#[async_trait]
impl CommandHandler for CompleteVisitHandler {
    fn command_type(&self) -> &'static str {
        COMPLETE_VISIT
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let visit_id = command.require_aggregate_id()?;
        let payload: CompleteVisit = command.parse_payload()?;
        let visit: Visit = load_aggregate(ctx.store, command.tenant_id(), visit_id).await?;
        let event = visit.complete(&payload.diagnosis, payload.notes, ctx.clock.now())?;
        Ok(vec![command.draft(visit_id, visit.version() + 1, &event)?])
    }
}

/// Handles `cancel_visit`.
pub struct CancelVisitHandler;

#[async_trait]
impl CommandHandler for CancelVisitHandler {
    fn command_type(&self) -> &'static str {
        CANCEL_VISIT
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let visit_id = command.require_aggregate_id()?;
        let payload: CancelVisit = command.parse_payload()?;
        let visit: Visit = load_aggregate(ctx.store, command.tenant_id(), visit_id).await?;
        let event = visit.cancel(&payload.reason, ctx.clock.now())?;
        Ok(vec![command.draft(visit_id, visit.version() + 1, &event)?])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use clinicops_core::command::{Command, CommandHandler, HandlerContext};
    use clinicops_core::error::DomainError;
    use clinicops_core::event::{AggregateType, Event};
    use clinicops_core::store::EventStore;
    use clinicops_event_store::InMemoryEventStore;
    use clinicops_test_support::{FixedClock, command, fixed_time};
    use serde_json::json;
    use uuid::Uuid;

    use super::{
        CompleteVisitHandler, RegisterPatientHandler, ScheduleVisitHandler, UpdatePatientHandler,
    };

    async fn run(
        store: &InMemoryEventStore,
        handler: &dyn CommandHandler,
        command: &Command,
    ) -> Result<Vec<Event>, DomainError> {
        let clock = FixedClock(fixed_time());
        let ctx = HandlerContext {
            store,
            clock: &clock,
        };
        let drafts = handler.handle(command, &ctx).await?;
        Ok(store.append_events(drafts).await?.events)
    }

    fn new_store() -> InMemoryEventStore {
        InMemoryEventStore::new(Arc::new(FixedClock(fixed_time())))
    }

    async fn register(store: &InMemoryEventStore) -> Uuid {
        let events = run(
            store,
            &RegisterPatientHandler,
            &command(
                "register_patient",
                json!({
                    "mrn": "MRN-2026-000123",
                    "first_name": "Ada",
                    "last_name": "Lovelace",
                    "date_of_birth": "1985-12-10",
                }),
            ),
        )
        .await
        .unwrap();
        events[0].aggregate_id
    }

    #[tokio::test]
    async fn test_register_patient_emits_patient_registered_at_version_one() {
        // Arrange
        let store = new_store();

        // Act
        let patient_id = register(&store).await;

        // Assert
        let events = store.get_aggregate_events(patient_id, 0).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, "patient_registered");
        assert_eq!(events[0].aggregate_type, AggregateType::Patient);
        assert_eq!(events[0].aggregate_version, 1);
        assert_eq!(events[0].payload["mrn"], "MRN-2026-000123");
    }

    #[tokio::test]
    async fn test_register_patient_rejects_bad_payload_shape() {
        let store = new_store();

        let result = run(
            &store,
            &RegisterPatientHandler,
            &command("register_patient", json!({ "mrn": 5 })),
        )
        .await;

        match result {
            Err(DomainError::Validation(errors)) => assert_eq!(errors.errors()[0].field, "payload"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_patient_requires_existing_patient() {
        let store = new_store();
        let missing = Uuid::new_v4();

        let result = run(
            &store,
            &UpdatePatientHandler,
            &command("update_patient", json!({ "phone": "555-0100" })).for_aggregate(missing),
        )
        .await;

        match result {
            Err(DomainError::AggregateNotFound(id)) => assert_eq!(id, missing),
            other => panic!("expected AggregateNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_patient_appends_next_version() {
        let store = new_store();
        let patient_id = register(&store).await;

        let events = run(
            &store,
            &UpdatePatientHandler,
            &command("update_patient", json!({ "phone": "555-0100" })).for_aggregate(patient_id),
        )
        .await
        .unwrap();

        assert_eq!(events[0].aggregate_version, 2);
        assert_eq!(events[0].payload, json!({ "patient_id": patient_id, "phone": "555-0100" }));
    }

    #[tokio::test]
    async fn test_schedule_visit_rejects_unknown_patient_and_blank_reason() {
        // Arrange
        let store = new_store();
        let cmd = command(
            "schedule_visit",
            json!({
                "patient_id": Uuid::new_v4(),
                "scheduled_at": "2026-01-20T09:00:00Z",
                "reason": "  ",
            }),
        );

        // Act
        let result = run(&store, &ScheduleVisitHandler, &cmd).await;

        // Assert
        match result {
            Err(DomainError::Validation(errors)) => {
                let fields: Vec<&str> = errors.errors().iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["reason", "patient_id"]);
            }
            other => panic!("expected Validation, got {other:?}"),
        }
        assert!(store.all_events().is_empty());
    }

    #[tokio::test]
    async fn test_complete_visit_twice_is_rejected() {
        // Arrange
        let store = new_store();
        let patient_id = register(&store).await;
        let scheduled = run(
            &store,
            &ScheduleVisitHandler,
            &command(
                "schedule_visit",
                json!({
                    "patient_id": patient_id,
                    "scheduled_at": "2026-01-20T09:00:00Z",
                    "reason": "Annual checkup",
                }),
            ),
        )
        .await
        .unwrap();
        let visit_id = scheduled[0].aggregate_id;
        let complete = command("complete_visit", json!({ "diagnosis": "Healthy" }))
            .for_aggregate(visit_id);

        // Act
        let first = run(&store, &CompleteVisitHandler, &complete).await.unwrap();
        let second = run(&store, &CompleteVisitHandler, &complete).await;

        // Assert
        assert_eq!(first[0].aggregate_version, 2);
        assert_eq!(first[0].payload["completed_at"], json!(fixed_time()));
        assert!(matches!(second, Err(DomainError::Validation(_))));
    }

    #[tokio::test]
    async fn test_visit_of_other_tenant_is_not_found() {
        let store = new_store();
        let patient_id = register(&store).await;
        let mut foreign = command("update_patient", json!({ "phone": "1" })).for_aggregate(patient_id);
        foreign.metadata.tenant_id = Uuid::new_v4();

        let result = run(&store, &UpdatePatientHandler, &foreign).await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
    }
}
