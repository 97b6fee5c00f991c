//! ClinicOps: Scheduling bounded context.
//!
//! Owns doctor profiles, the availability inputs that shape a doctor's
//! calendar (weekly schedules, overrides, leave, holidays, emergencies and
//! forced blocks), the slots generated from them, tentative holds and
//! appointments booked against slots.

pub mod application;
pub mod domain;
