//! ClinicOps projections.
//!
//! Folds the event log into the read-model tables. A
//! [`ProjectionDispatcher`] routes each event to every handler that consumes
//! its type; a [`ProjectionWorker`] drives the dispatcher from a durable
//! checkpoint.

pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod handlers;
pub mod worker;

pub use dispatcher::{DispatchReport, ProjectionDispatcher};
pub use error::ProjectionError;
pub use handler::ProjectionHandler;
pub use handlers::default_handlers;
pub use worker::{ProjectionWorker, WorkerConfig, WorkerHandle};
