//! ClinicOps: Patients & Visits bounded context.
//!
//! Responsible for the patient registry and the clinical visit lifecycle
//! (scheduled, completed, cancelled).

pub mod application;
pub mod domain;
