//! `doctor_profiles` table.

use chrono::{DateTime, Utc};
use clinicops_core::event::Event;
use clinicops_core::read_model::{ReadModelTable, ReadModelWrite};
use clinicops_scheduling::domain::aggregates::DoctorStatus;
use clinicops_scheduling::domain::events::{
    DOCTOR_PROFILE_ACTIVATED_EVENT_TYPE, DOCTOR_PROFILE_CREATED_EVENT_TYPE,
    DOCTOR_PROFILE_UPDATED_EVENT_TYPE, DoctorProfileEvent,
};
use clinicops_scheduling::domain::read_models::DoctorProfileRow;
use serde::Serialize;

use crate::error::ProjectionError;
use crate::handler::{ProjectionHandler, decode, insert, patch};

#[derive(Serialize)]
struct Activation {
    status: DoctorStatus,
    is_bookable: bool,
    is_visible: bool,
    activated_at: DateTime<Utc>,
}

/// Maintains `doctor_profiles`.
pub struct DoctorProfileProjection;

impl ProjectionHandler for DoctorProfileProjection {
    fn name(&self) -> &'static str {
        "doctor_profiles"
    }

    fn event_types(&self) -> &'static [&'static str] {
        &[
            DOCTOR_PROFILE_CREATED_EVENT_TYPE,
            DOCTOR_PROFILE_ACTIVATED_EVENT_TYPE,
            DOCTOR_PROFILE_UPDATED_EVENT_TYPE,
        ]
    }

    fn project(&self, event: &Event) -> Result<Vec<ReadModelWrite>, ProjectionError> {
        let table = ReadModelTable::DoctorProfiles;
        let write = match decode::<DoctorProfileEvent>(event)? {
            DoctorProfileEvent::DoctorProfileCreated(d) => insert(
                table,
                event,
                d.doctor_id,
                &DoctorProfileRow {
                    doctor_id: d.doctor_id,
                    hospital_id: d.hospital_id,
                    full_name: d.full_name,
                    specialty: d.specialty,
                    license_number: d.license_number,
                    status: DoctorStatus::Draft,
                    is_bookable: false,
                    is_visible: false,
                    activated_at: None,
                },
            )?,
            DoctorProfileEvent::DoctorProfileActivated(a) => patch(
                table,
                event,
                a.doctor_id,
                &Activation {
                    status: DoctorStatus::Active,
                    is_bookable: true,
                    is_visible: true,
                    activated_at: a.activated_at,
                },
            )?,
            DoctorProfileEvent::DoctorProfileUpdated(changes) => {
                patch(table, event, changes.doctor_id, &changes)?
            }
        };
        Ok(vec![write])
    }
}
