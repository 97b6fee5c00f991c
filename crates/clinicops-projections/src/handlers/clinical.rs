//! `patients` and `visits` tables.

use chrono::{DateTime, Utc};
use clinicops_clinical::domain::aggregates::VisitStatus;
use clinicops_clinical::domain::events::{
    PATIENT_REGISTERED_EVENT_TYPE, PATIENT_UPDATED_EVENT_TYPE, PatientEvent,
    VISIT_CANCELLED_EVENT_TYPE, VISIT_COMPLETED_EVENT_TYPE, VISIT_SCHEDULED_EVENT_TYPE, VisitEvent,
};
use clinicops_clinical::domain::read_models::{PatientRow, VisitRow};
use clinicops_core::event::Event;
use clinicops_core::read_model::{ReadModelTable, ReadModelWrite};
use serde::Serialize;

use crate::error::ProjectionError;
use crate::handler::{ProjectionHandler, decode, insert, patch};

/// Maintains `patients`.
pub struct PatientProjection;

impl ProjectionHandler for PatientProjection {
    fn name(&self) -> &'static str {
        "patients"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[PATIENT_REGISTERED_EVENT_TYPE, PATIENT_UPDATED_EVENT_TYPE]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let write = match decode::<PatientEvent>(event)? {
            PatientEvent::PatientRegistered(p) => insert(
                ReadModelTable::Patients,
                event,
                p.patient_id,
                &PatientRow {
                    patient_id: p.patient_id,
                    mrn: p.mrn,
                    first_name: p.first_name,
                    last_name: p.last_name,
                    date_of_birth: p.date_of_birth,
                    sex: p.sex,
                    phone: p.phone,
                    email: p.email,
                    address: p.address,
                    registered_at: event.occurred_at,
                },
            )?,
            PatientEvent::PatientUpdated(changes) => {
                patch(ReadModelTable::Patients, event, changes.patient_id, &changes)?
            }
        };
        Ok(vec![write])
    }
}

#[derive(Serialize)]
struct VisitCompletion {
    status: VisitStatus,
    diagnosis: String,
    notes: Option<String>,
    completed_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct VisitCancellation {
    status: VisitStatus,
    cancellation_reason: String,
    cancelled_at: DateTime<Utc>,
}

/// Maintains `visits`.
pub struct VisitProjection;

impl ProjectionHandler for VisitProjection {
    fn name(&self) -> &'static str {
        "visits"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            VISIT_SCHEDULED_EVENT_TYPE,
            VISIT_COMPLETED_EVENT_TYPE,
            VISIT_CANCELLED_EVENT_TYPE,
        ]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let table = ReadModelTable::Visits;
        let write = match decode::<VisitEvent>(event)? {
            VisitEvent::VisitScheduled(v) => insert(
                table,
                event,
                v.visit_id,
                &VisitRow {
                    visit_id: v.visit_id,
                    patient_id: v.patient_id,
                    doctor_id: v.doctor_id,
                    scheduled_at: v.scheduled_at,
                    reason: v.reason,
                    status: VisitStatus::Scheduled,
                    diagnosis: None,
                    notes: None,
                    completed_at: None,
                    cancellation_reason: None,
                    cancelled_at: None,
                },
            )?,
            VisitEvent::VisitCompleted(v) => patch(
                table,
                event,
                v.visit_id,
                &VisitCompletion {
                    status: VisitStatus::Completed,
                    diagnosis: v.diagnosis,
                    notes: v.notes,
                    completed_at: v.completed_at,
                },
            )?,
            VisitEvent::VisitCancelled(v) => patch(
                table,
                event,
                v.visit_id,
                &VisitCancellation {
                    status: VisitStatus::Cancelled,
                    cancellation_reason: v.reason,
                    cancelled_at: v.cancelled_at,
                },
            )?,
        };
        Ok(vec![write])
    }
}
