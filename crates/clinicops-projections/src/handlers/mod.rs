//! Read-model handlers, one per owned table.

mod appointments;
mod availability;
mod clinical;
mod doctors;
mod holds;
mod slots;

use std::sync::Arc;

pub use appointments::AppointmentProjection;
pub use availability::{
    EmergencyUnavailabilityProjection, ForcedBlockProjection, HolidayProjection,
    LeaveRequestProjection, ScheduleOverrideProjection, DoctorScheduleProjection,
};
pub use clinical::{PatientProjection, VisitProjection};
pub use doctors::DoctorProfileProjection;
pub use holds::TentativeHoldProjection;
pub use slots::AppointmentSlotProjection;

use crate::handler::ProjectionHandler;

/// Every handler, for the "main" projection group.
#[must_use]
pub fn default_handlers() -> Vec<Arc<dyn ProjectionHandler>> {
    vec![
        Arc::new(PatientProjection),
        Arc::new(VisitProjection),
        Arc::new(DoctorProfileProjection),
        Arc::new(DoctorScheduleProjection),
        Arc::new(ScheduleOverrideProjection),
        Arc::new(LeaveRequestProjection),
        Arc::new(HolidayProjection),
        Arc::new(EmergencyUnavailabilityProjection),
        Arc::new(ForcedBlockProjection),
        Arc::new(AppointmentSlotProjection),
        Arc::new(TentativeHoldProjection),
        Arc::new(AppointmentProjection),
    ]
}
