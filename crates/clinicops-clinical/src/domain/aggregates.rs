//! Aggregate roots for the Patients & Visits context.

use chrono::{DateTime, Datelike, Utc};
use clinicops_core::aggregate::AggregateRoot;
use clinicops_core::error::{DomainError, ValidationErrors};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::commands::{RegisterPatient, UpdatePatient};
use super::events::{
    PatientEvent, PatientRegistered, PatientUpdated, VisitCancelled, VisitCompleted, VisitEvent,
};

/// Returns `true` for `MRN-YYYY-NNNNNN`.
#[must_use]
pub fn is_valid_mrn(mrn: &str) -> bool {
    let mut parts = mrn.split('-');
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some("MRN"), Some(year), Some(serial), None)
            if year.len() == 4
                && serial.len() == 6
                && year.bytes().all(|b| b.is_ascii_digit())
                && serial.bytes().all(|b| b.is_ascii_digit())
    )
}

fn check_email(errors: &mut ValidationErrors, email: Option<&str>) {
    if let Some(email) = email {
        errors.check(
            email.contains('@') && !email.starts_with('@') && !email.ends_with('@'),
            "email",
            "must be an email address",
        );
    }
}

/// The aggregate root for a patient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version (event count).
    pub version: i64,
    /// Medical record number.
    pub mrn: Option<String>,
    /// Given name.
    pub first_name: String,
    /// Family name.
    pub last_name: String,
}

impl Patient {
    /// Validates a registration and produces its event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` listing every invalid field.
    pub fn register(
        patient_id: Uuid,
        command: &RegisterPatient,
        today: chrono::NaiveDate,
    ) -> Result<PatientEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        errors.check(is_valid_mrn(&command.mrn), "mrn", "must match MRN-YYYY-NNNNNN");
        errors.require_text(&command.first_name, "first_name");
        errors.require_text(&command.last_name, "last_name");
        errors.check(
            command.date_of_birth <= today,
            "date_of_birth",
            "must not be in the future",
        );
        errors.check(
            command.date_of_birth.year() >= 1900,
            "date_of_birth",
            "must be after 1900",
        );
        check_email(&mut errors, command.email.as_deref());
        errors.into_result()?;

        Ok(PatientEvent::PatientRegistered(PatientRegistered {
            patient_id,
            mrn: command.mrn.clone(),
            first_name: command.first_name.trim().to_owned(),
            last_name: command.last_name.trim().to_owned(),
            date_of_birth: command.date_of_birth,
            sex: command.sex.clone(),
            phone: command.phone.clone(),
            email: command.email.clone(),
            address: command.address.clone(),
        }))
    }

    /// Validates a demographic change and produces its event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if no field is supplied or a
    /// supplied field is invalid.
    pub fn update(&self, command: &UpdatePatient) -> Result<PatientEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        let any = command.first_name.is_some()
            || command.last_name.is_some()
            || command.phone.is_some()
            || command.email.is_some()
            || command.address.is_some();
        errors.check(any, "payload", "at least one field must be supplied");
        if let Some(first_name) = &command.first_name {
            errors.require_text(first_name, "first_name");
        }
        if let Some(last_name) = &command.last_name {
            errors.require_text(last_name, "last_name");
        }
        check_email(&mut errors, command.email.as_deref());
        errors.into_result()?;

        Ok(PatientEvent::PatientUpdated(PatientUpdated {
            patient_id: self.id,
            first_name: command.first_name.clone(),
            last_name: command.last_name.clone(),
            phone: command.phone.clone(),
            email: command.email.clone(),
            address: command.address.clone(),
        }))
    }
}

impl AggregateRoot for Patient {
    type Event = PatientEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            mrn: None,
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &PatientEvent) {
        match event {
            PatientEvent::PatientRegistered(e) => {
                self.mrn = Some(e.mrn.clone());
                self.first_name.clone_from(&e.first_name);
                self.last_name.clone_from(&e.last_name);
            }
            PatientEvent::PatientUpdated(e) => {
                if let Some(first_name) = &e.first_name {
                    self.first_name.clone_from(first_name);
                }
                if let Some(last_name) = &e.last_name {
                    self.last_name.clone_from(last_name);
                }
            }
        }
        self.version += 1;
    }
}

/// Lifecycle of a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitStatus {
    /// Booked and not yet seen.
    Scheduled,
    /// Seen; diagnosis recorded.
    Completed,
    /// Called off.
    Cancelled,
}

impl VisitStatus {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// The aggregate root for a visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Visit {
    /// Aggregate identifier.
    pub id: Uuid,
    /// Current version (event count).
    pub version: i64,
    /// The patient being seen.
    pub patient_id: Option<Uuid>,
    /// Lifecycle state; `None` before scheduling.
    pub status: Option<VisitStatus>,
}

impl Visit {
    fn require_scheduled(&self, errors: &mut ValidationErrors) {
        if self.status != Some(VisitStatus::Scheduled) {
            let current = self.status.map_or("unscheduled", VisitStatus::as_str);
            errors.push("status", format!("visit is {current}, expected scheduled"));
        }
    }

    /// Completes the visit with a diagnosis.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the visit is not scheduled or the
    /// diagnosis is blank.
    pub fn complete(
        &self,
        diagnosis: &str,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<VisitEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        self.require_scheduled(&mut errors);
        errors.require_text(diagnosis, "diagnosis");
        errors.into_result()?;

        Ok(VisitEvent::VisitCompleted(VisitCompleted {
            visit_id: self.id,
            diagnosis: diagnosis.trim().to_owned(),
            notes,
            completed_at: at,
        }))
    }

    /// Cancels the visit.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the visit is not scheduled or the
    /// reason is blank.
    pub fn cancel(&self, reason: &str, at: DateTime<Utc>) -> Result<VisitEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        self.require_scheduled(&mut errors);
        errors.require_text(reason, "reason");
        errors.into_result()?;

        Ok(VisitEvent::VisitCancelled(VisitCancelled {
            visit_id: self.id,
            reason: reason.trim().to_owned(),
            cancelled_at: at,
        }))
    }
}

impl AggregateRoot for Visit {
    type Event = VisitEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            patient_id: None,
            status: None,
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &VisitEvent) {
        match event {
            VisitEvent::VisitScheduled(e) => {
                self.patient_id = Some(e.patient_id);
                self.status = Some(VisitStatus::Scheduled);
            }
            VisitEvent::VisitCompleted(_) => self.status = Some(VisitStatus::Completed),
            VisitEvent::VisitCancelled(_) => self.status = Some(VisitStatus::Cancelled),
        }
        self.version += 1;
    }
}
