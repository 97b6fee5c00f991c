use chrono::{DateTime, Utc};
use clinicops_core::aggregate::AggregateRoot;
use clinicops_core::error::{DomainError, ValidationErrors};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::events::{AppointmentCancelled, AppointmentEvent};
use crate::domain::slot_planning::ConsultationMode;

/// Lifecycle of an appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Booked,
    Cancelled,
}

/// The aggregate root for an appointment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub version: i64,
    pub slot_id: Option<Uuid>,
    pub generation_run_id: Option<Uuid>,
    pub consultation_mode: Option<ConsultationMode>,
    pub status: Option<AppointmentStatus>,
}

impl Appointment {
    /// Cancels a booked appointment.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if it is not booked or the reason is
    /// blank.
    pub fn cancel(&self, reason: &str, at: DateTime<Utc>) -> Result<AppointmentEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        errors.check(
            self.status == Some(AppointmentStatus::Booked),
            "status",
            "only booked appointments can be cancelled",
        );
        errors.require_text(reason, "reason");
        errors.into_result()?;

        Ok(AppointmentEvent::AppointmentCancelled(AppointmentCancelled {
            appointment_id: self.id,
            slot_id: self.slot_id.unwrap_or_default(),
            reason: reason.trim().to_owned(),
            cancelled_at: at,
        }))
    }
}

impl AggregateRoot for Appointment {
    type Event = AppointmentEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            slot_id: None,
            generation_run_id: None,
            consultation_mode: None,
            status: None,
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &AppointmentEvent) {
        match event {
            AppointmentEvent::AppointmentBooked(e) => {
                self.slot_id = Some(e.slot_id);
                self.generation_run_id = Some(e.generation_run_id);
                self.consultation_mode = Some(e.consultation_mode);
                self.status = Some(AppointmentStatus::Booked);
            }
            AppointmentEvent::AppointmentCancelled(_) => {
                self.status = Some(AppointmentStatus::Cancelled);
            }
        }
        self.version += 1;
    }
}
