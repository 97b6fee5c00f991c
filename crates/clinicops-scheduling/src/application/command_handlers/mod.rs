//! Command handlers for the Scheduling context.
//!
//! Handlers are grouped by the streams they write: doctor profiles, the
//! availability inputs, slots and appointments.

mod appointments;
mod availability;
mod doctors;
mod slots;

use std::sync::Arc;

use clinicops_core::aggregate::{AggregateRoot, load_aggregate, load_aggregate_with_snapshot};
use clinicops_core::command::{Command, CommandHandler, HandlerContext};
use clinicops_core::error::{DomainError, ValidationErrors};
use clinicops_core::event::{AggregateType, EventDraft};
use uuid::Uuid;

pub use appointments::{BookAppointmentHandler, CancelAppointmentHandler};
pub use availability::{
    ApproveLeaveRequestHandler, CancelHolidayHandler, CancelScheduleOverrideHandler,
    CreateDoctorScheduleHandler, CreateForcedBlockHandler, CreateScheduleOverrideHandler,
    DeactivateDoctorScheduleHandler, DeclareEmergencyUnavailabilityHandler, DeclareHolidayHandler,
    LiftForcedBlockHandler, RejectLeaveRequestHandler, ResolveEmergencyUnavailabilityHandler,
    SubmitLeaveRequestHandler, UpdateDoctorScheduleHandler,
};
pub use doctors::{
    ActivateDoctorProfileHandler, CreateDoctorProfileHandler, UpdateDoctorProfileHandler,
};
pub use slots::{
    BlockSlotHandler, ExpireHoldHandler, GenerateSlotsHandler, PlaceHoldHandler,
    RegenerateSlotsHandler, ReleaseHoldHandler, UnblockSlotHandler,
};

use crate::domain::aggregates::{AppointmentSlot, SlotGenerationRun};
use crate::domain::events::{AppointmentSlotEvent, GeneratedSlot};

/// Every handler of this context, for bus registration.
#[must_use]
pub fn command_handlers() -> Vec<Arc<dyn CommandHandler>> {
    vec![
        Arc::new(CreateDoctorProfileHandler),
        Arc::new(ActivateDoctorProfileHandler),
        Arc::new(UpdateDoctorProfileHandler),
        Arc::new(CreateDoctorScheduleHandler),
        Arc::new(UpdateDoctorScheduleHandler),
        Arc::new(DeactivateDoctorScheduleHandler),
        Arc::new(CreateScheduleOverrideHandler),
        Arc::new(CancelScheduleOverrideHandler),
        Arc::new(SubmitLeaveRequestHandler),
        Arc::new(ApproveLeaveRequestHandler),
        Arc::new(RejectLeaveRequestHandler),
        Arc::new(DeclareHolidayHandler),
        Arc::new(CancelHolidayHandler),
        Arc::new(DeclareEmergencyUnavailabilityHandler),
        Arc::new(ResolveEmergencyUnavailabilityHandler),
        Arc::new(CreateForcedBlockHandler),
        Arc::new(LiftForcedBlockHandler),
        Arc::new(GenerateSlotsHandler),
        Arc::new(RegenerateSlotsHandler),
        Arc::new(PlaceHoldHandler),
        Arc::new(ReleaseHoldHandler),
        Arc::new(ExpireHoldHandler),
        Arc::new(BlockSlotHandler),
        Arc::new(UnblockSlotHandler),
        Arc::new(BookAppointmentHandler),
        Arc::new(CancelAppointmentHandler),
    ]
}

/// Picks the id of a new aggregate: payload, then command target, then fresh.
fn new_aggregate_id(from_payload: Option<Uuid>, command: &Command) -> Uuid {
    from_payload
        .or(command.aggregate_id)
        .unwrap_or_else(Uuid::new_v4)
}

/// Records a validation error unless `id` is an existing stream of the
/// command's tenant.
async fn require_reference(
    ctx: &HandlerContext<'_>,
    command: &Command,
    errors: &mut ValidationErrors,
    field: &str,
    id: Uuid,
    aggregate_type: AggregateType,
) -> Result<(), DomainError> {
    if !ctx.aggregate_exists(command.tenant_id(), id, aggregate_type).await? {
        errors.push(field, format!("{aggregate_type} does not exist"));
    }
    Ok(())
}

/// Drafts one event against the next version of an existing aggregate.
fn next<A: AggregateRoot>(
    command: &Command,
    aggregate: &A,
    event: &A::Event,
) -> Result<Vec<EventDraft>, DomainError> {
    Ok(vec![command.draft(
        aggregate.aggregate_id(),
        aggregate.version() + 1,
        event,
    )?])
}

/// A slot as handlers see it: the shape fixed by its generation run plus its
/// own ledger.
struct LoadedSlot {
    doctor_id: Uuid,
    planned: GeneratedSlot,
    ledger: AppointmentSlot,
}

async fn load_slot(
    ctx: &HandlerContext<'_>,
    tenant_id: Uuid,
    generation_run_id: Uuid,
    slot_id: Uuid,
) -> Result<LoadedSlot, DomainError> {
    let run: SlotGenerationRun = load_aggregate(ctx.store, tenant_id, generation_run_id).await?;
    let planned = run.slot(slot_id)?.clone();
    let ledger: AppointmentSlot = load_aggregate_with_snapshot(ctx.store, ctx.clock, slot_id).await?;
    Ok(LoadedSlot {
        doctor_id: run.doctor_id.unwrap_or_default(),
        planned,
        ledger,
    })
}

/// Drafts consecutive slot events starting after the ledger's version.
fn slot_drafts(
    command: &Command,
    ledger: &AppointmentSlot,
    events: impl IntoIterator<Item = AppointmentSlotEvent>,
) -> Result<Vec<EventDraft>, DomainError> {
    events
        .into_iter()
        .zip(ledger.version() + 1..)
        .map(|(event, version)| command.draft(ledger.id, version, &event))
        .collect()
}
