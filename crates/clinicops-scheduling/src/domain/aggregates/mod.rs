//! Aggregate roots for the Scheduling context.

mod appointment;
mod availability;
mod doctor;
mod slot;

pub use appointment::{Appointment, AppointmentStatus};
pub use availability::{
    DoctorSchedule, EmergencyUnavailability, ForcedBlock, Holiday, LeaveRequest, LeaveStatus,
    ScheduleOverride,
};
pub use doctor::{DoctorProfile, DoctorStatus};
pub use slot::{ActiveHold, AppointmentSlot, SlotGenerationRun, SlotStatus};
