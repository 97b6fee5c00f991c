use async_trait::async_trait;
use clinicops_core::aggregate::load_aggregate;
use clinicops_core::command::{Command, CommandHandler, HandlerContext};
use clinicops_core::error::DomainError;
use clinicops_core::event::EventDraft;

use super::{new_aggregate_id, next};
use crate::domain::aggregates::DoctorProfile;
use crate::domain::commands::{
    ACTIVATE_DOCTOR_PROFILE, CREATE_DOCTOR_PROFILE, CreateDoctorProfile, UPDATE_DOCTOR_PROFILE,
    UpdateDoctorProfile,
};

/// Handles `create_doctor_profile`.
pub struct CreateDoctorProfileHandler;

#[async_trait]
impl CommandHandler for CreateDoctorProfileHandler {
    fn command_type(&self) -> &'static str {
        CREATE_DOCTOR_PROFILE
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: CreateDoctorProfile = command.parse_payload()?;
        let doctor_id = new_aggregate_id(payload.doctor_id, command);
        let event = DoctorProfile::create(doctor_id, &payload)?;
        ctx.ensure_new(doctor_id).await?;
        Ok(vec![command.draft(doctor_id, 1, &event)?])
    }
}

/// Handles `activate_doctor_profile`.
pub struct ActivateDoctorProfileHandler;

#[async_trait]
impl CommandHandler for ActivateDoctorProfileHandler {
    fn command_type(&self) -> &'static str {
        ACTIVATE_DOCTOR_PROFILE
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let doctor_id = command.require_aggregate_id()?;
        let profile: DoctorProfile = load_aggregate(ctx.store, command.tenant_id(), doctor_id).await?;
        let event = profile.activate(ctx.clock.now())?;
        next(command, &profile, &event)
    }
}

/// Handles `update_doctor_profile`.
pub struct UpdateDoctorProfileHandler;

#[async_trait]
impl CommandHandler for UpdateDoctorProfileHandler {
    fn command_type(&self) -> &'static str {
        UPDATE_DOCTOR_PROFILE
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let doctor_id = command.require_aggregate_id()?;
        let payload: UpdateDoctorProfile = command.parse_payload()?;
        let profile: DoctorProfile = load_aggregate(ctx.store, command.tenant_id(), doctor_id).await?;
        let event = profile.update(&payload)?;
        next(command, &profile, &event)
    }
}
