use async_trait::async_trait;
use clinicops_core::aggregate::load_aggregate;
use clinicops_core::command::{Command, CommandHandler, HandlerContext};
use clinicops_core::error::{DomainError, ValidationErrors};
use clinicops_core::event::{AggregateType, EventDraft};

use super::{load_slot, new_aggregate_id, require_reference, slot_drafts};
use crate::domain::aggregates::Appointment;
use crate::domain::commands::{
    BOOK_APPOINTMENT, BookAppointment, CANCEL_APPOINTMENT, CancelAppointment,
};
use crate::domain::events::{AppointmentBooked, AppointmentEvent};

/// Handles `book_appointment`: creates the appointment and takes a place on
/// its slot in one append.
pub struct BookAppointmentHandler;

#[async_trait]
impl CommandHandler for BookAppointmentHandler {
    fn command_type(&self) -> &'static str {
        BOOK_APPOINTMENT
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: BookAppointment = command.parse_payload()?;
        let mut errors = ValidationErrors::new();
        require_reference(
            ctx,
            command,
            &mut errors,
            "patient_id",
            payload.patient_id,
            AggregateType::Patient,
        )
        .await?;
        errors.into_result()?;

        let loaded = load_slot(ctx, command.tenant_id(), payload.generation_run_id, payload.slot_id).await?;
        let appointment_id = new_aggregate_id(payload.appointment_id, command);
        ctx.ensure_new(appointment_id).await?;
        let now = ctx.clock.now();
        let booked = loaded.ledger.book(
            &loaded.planned,
            appointment_id,
            payload.patient_id,
            payload.consultation_mode,
            payload.hold_id,
            now,
        )?;

        let appointment = AppointmentEvent::AppointmentBooked(AppointmentBooked {
            appointment_id,
            slot_id: payload.slot_id,
            generation_run_id: payload.generation_run_id,
            doctor_id: loaded.doctor_id,
            patient_id: payload.patient_id,
            date: loaded.planned.date,
            start_time: loaded.planned.start_time,
            end_time: loaded.planned.end_time,
            consultation_mode: payload.consultation_mode,
            reason: payload.reason,
            booked_at: now,
        });
        let mut drafts = vec![command.draft(appointment_id, 1, &appointment)?];
        let slot_events = loaded.ledger.lapse_expired(now).into_iter().chain([booked]);
        drafts.extend(slot_drafts(command, &loaded.ledger, slot_events)?);
        Ok(drafts)
    }
}

/// Handles `cancel_appointment`: cancels it and returns its place to the
/// slot.
pub struct CancelAppointmentHandler;

#[async_trait]
impl CommandHandler for CancelAppointmentHandler {
    fn command_type(&self) -> &'static str {
        CANCEL_APPOINTMENT
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let appointment_id = command.require_aggregate_id()?;
        let payload: CancelAppointment = command.parse_payload()?;
        let appointment: Appointment =
            load_aggregate(ctx.store, command.tenant_id(), appointment_id).await?;
        let now = ctx.clock.now();
        let cancelled = appointment.cancel(&payload.reason, now)?;

        let (Some(slot_id), Some(run_id), Some(mode)) = (
            appointment.slot_id,
            appointment.generation_run_id,
            appointment.consultation_mode,
        ) else {
            return Err(DomainError::Infrastructure(format!(
                "appointment {appointment_id} has no slot"
            )));
        };
        let loaded = load_slot(ctx, command.tenant_id(), run_id, slot_id).await?;
        let returned = loaded
            .ledger
            .cancel_booking(&loaded.planned, appointment_id, mode, now);

        let mut drafts = vec![command.draft(appointment_id, appointment.version + 1, &cancelled)?];
        drafts.extend(slot_drafts(command, &loaded.ledger, [returned])?);
        Ok(drafts)
    }
}
