use chrono::{DateTime, Utc};
use clinicops_core::aggregate::AggregateRoot;
use clinicops_core::error::{DomainError, ValidationErrors};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::commands::{CreateDoctorProfile, UpdateDoctorProfile};
use crate::domain::events::{
    DoctorProfileActivated, DoctorProfileCreated, DoctorProfileEvent, DoctorProfileUpdated,
};

/// Lifecycle of a doctor profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoctorStatus {
    /// Created, not yet live.
    Draft,
    /// Live.
    Active,
}

/// The aggregate root for a doctor profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorProfile {
    pub id: Uuid,
    pub version: i64,
    pub hospital_id: Option<Uuid>,
    pub status: Option<DoctorStatus>,
    pub is_bookable: bool,
    pub is_visible: bool,
}

impl DoctorProfile {
    /// Validates a new profile and produces its event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` listing every blank field.
    pub fn create(
        doctor_id: Uuid,
        command: &CreateDoctorProfile,
    ) -> Result<DoctorProfileEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        errors.require_text(&command.full_name, "full_name");
        errors.require_text(&command.specialty, "specialty");
        errors.into_result()?;

        Ok(DoctorProfileEvent::DoctorProfileCreated(DoctorProfileCreated {
            doctor_id,
            hospital_id: command.hospital_id,
            full_name: command.full_name.trim().to_owned(),
            specialty: command.specialty.trim().to_owned(),
            license_number: command.license_number.clone(),
        }))
    }

    /// Takes a draft profile live.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless the profile is a draft.
    pub fn activate(&self, at: DateTime<Utc>) -> Result<DoctorProfileEvent, DomainError> {
        if self.status != Some(DoctorStatus::Draft) {
            return Err(DomainError::invalid("status", "only draft profiles can be activated"));
        }
        Ok(DoctorProfileEvent::DoctorProfileActivated(DoctorProfileActivated {
            doctor_id: self.id,
            activated_at: at,
        }))
    }

    /// Validates a profile change and produces its event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if nothing changes, a name is blank,
    /// or a draft profile is made bookable.
    pub fn update(&self, command: &UpdateDoctorProfile) -> Result<DoctorProfileEvent, DomainError> {
        let mut errors = ValidationErrors::new();
        let any = command.full_name.is_some()
            || command.specialty.is_some()
            || command.license_number.is_some()
            || command.is_bookable.is_some()
            || command.is_visible.is_some();
        errors.check(any, "payload", "at least one field must be supplied");
        if let Some(full_name) = &command.full_name {
            errors.require_text(full_name, "full_name");
        }
        if let Some(specialty) = &command.specialty {
            errors.require_text(specialty, "specialty");
        }
        if command.is_bookable == Some(true) {
            errors.check(
                self.status == Some(DoctorStatus::Active),
                "is_bookable",
                "profile must be active",
            );
        }
        errors.into_result()?;

        Ok(DoctorProfileEvent::DoctorProfileUpdated(DoctorProfileUpdated {
            doctor_id: self.id,
            full_name: command.full_name.as_deref().map(|s| s.trim().to_owned()),
            specialty: command.specialty.as_deref().map(|s| s.trim().to_owned()),
            license_number: command.license_number.clone(),
            is_bookable: command.is_bookable,
            is_visible: command.is_visible,
        }))
    }

    /// Returns `true` if slots may be generated and booked for the doctor.
    #[must_use]
    pub fn accepts_bookings(&self) -> bool {
        self.status == Some(DoctorStatus::Active) && self.is_bookable
    }
}

impl AggregateRoot for DoctorProfile {
    type Event = DoctorProfileEvent;

    fn new(aggregate_id: Uuid) -> Self {
        Self {
            id: aggregate_id,
            version: 0,
            hospital_id: None,
            status: None,
            is_bookable: false,
            is_visible: false,
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(&mut self, event: &DoctorProfileEvent) {
        match event {
            DoctorProfileEvent::DoctorProfileCreated(e) => {
                self.hospital_id = Some(e.hospital_id);
                self.status = Some(DoctorStatus::Draft);
            }
            DoctorProfileEvent::DoctorProfileActivated(_) => {
                self.status = Some(DoctorStatus::Active);
                self.is_bookable = true;
                self.is_visible = true;
            }
            DoctorProfileEvent::DoctorProfileUpdated(e) => {
                if let Some(bookable) = e.is_bookable {
                    self.is_bookable = bookable;
                }
                if let Some(visible) = e.is_visible {
                    self.is_visible = visible;
                }
            }
        }
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn created() -> DoctorProfile {
        let mut profile = DoctorProfile::new(Uuid::new_v4());
        let event = DoctorProfile::create(
            profile.id,
            &CreateDoctorProfile {
                doctor_id: None,
                hospital_id: Uuid::new_v4(),
                full_name: "Grace Hopper".into(),
                specialty: "Cardiology".into(),
                license_number: None,
            },
        )
        .unwrap();
        profile.apply(&event);
        profile
    }

    #[test]
    fn test_new_profile_is_not_bookable_until_activated() {
        // Arrange
        let mut profile = created();
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();

        // Act
        let before = profile.accepts_bookings();
        let event = profile.activate(at).unwrap();
        profile.apply(&event);

        // Assert
        assert!(!before);
        assert!(profile.accepts_bookings());
        assert_eq!(profile.version, 2);
    }

    #[test]
    fn test_draft_profile_cannot_be_made_bookable() {
        let profile = created();

        let result = profile.update(&UpdateDoctorProfile {
            is_bookable: Some(true),
            ..UpdateDoctorProfile::default()
        });

        match result {
            Err(DomainError::Validation(errors)) => {
                assert_eq!(errors.errors()[0].field, "is_bookable");
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_activate_twice_is_rejected() {
        let mut profile = created();
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let event = profile.activate(at).unwrap();
        profile.apply(&event);

        assert!(profile.activate(at).is_err());
    }
}
