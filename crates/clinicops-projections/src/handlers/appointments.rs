//! `appointments` table.

use chrono::{DateTime, Utc};
use clinicops_core::event::Event;
use clinicops_core::read_model::{ReadModelTable, ReadModelWrite};
use clinicops_scheduling::domain::aggregates::AppointmentStatus;
use clinicops_scheduling::domain::events::{
    APPOINTMENT_BOOKED_EVENT_TYPE, APPOINTMENT_CANCELLED_EVENT_TYPE, AppointmentEvent,
};
use clinicops_scheduling::domain::read_models::AppointmentRow;
use serde::Serialize;

use crate::error::ProjectionError;
use crate::handler::{ProjectionHandler, decode, insert, patch};

#[derive(Serialize)]
struct Cancellation {
    status: AppointmentStatus,
    cancellation_reason: String,
    cancelled_at: DateTime<Utc>,
}

/// Maintains `appointments`.
pub struct AppointmentProjection;

impl ProjectionHandler for AppointmentProjection {
    fn name(&self) -> &'static str {
        "appointments"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[APPOINTMENT_BOOKED_EVENT_TYPE, APPOINTMENT_CANCELLED_EVENT_TYPE]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let table = ReadModelTable::Appointments;
        let write = match decode::<AppointmentEvent>(event)? {
            AppointmentEvent::AppointmentBooked(a) => insert(
                table,
                event,
                a.appointment_id,
                &AppointmentRow {
                    appointment_id: a.appointment_id,
                    slot_id: a.slot_id,
                    generation_run_id: a.generation_run_id,
                    doctor_id: a.doctor_id,
                    patient_id: a.patient_id,
                    date: a.date,
                    start_time: a.start_time,
                    end_time: a.end_time,
                    consultation_mode: a.consultation_mode,
                    reason: a.reason,
                    status: AppointmentStatus::Booked,
                    booked_at: a.booked_at,
                    cancellation_reason: None,
                    cancelled_at: None,
                },
            )?,
            AppointmentEvent::AppointmentCancelled(c) => patch(
                table,
                event,
                c.appointment_id,
                &Cancellation {
                    status: AppointmentStatus::Cancelled,
                    cancellation_reason: c.reason,
                    cancelled_at: c.cancelled_at,
                },
            )?,
        };
        Ok(vec![write])
    }
}
