use async_trait::async_trait;
use clinicops_core::aggregate::load_aggregate;
use clinicops_core::command::{Command, CommandHandler, HandlerContext};
use clinicops_core::error::{DomainError, ValidationErrors};
use clinicops_core::event::{AggregateType, EventDraft};
use uuid::Uuid;

use super::{new_aggregate_id, next, require_reference};
use crate::domain::aggregates::{
    DoctorSchedule, EmergencyUnavailability, ForcedBlock, Holiday, LeaveRequest, ScheduleOverride,
};
use crate::domain::commands::{
    APPROVE_LEAVE_REQUEST, CANCEL_HOLIDAY, CANCEL_SCHEDULE_OVERRIDE, CREATE_DOCTOR_SCHEDULE,
    CREATE_FORCED_BLOCK, CREATE_SCHEDULE_OVERRIDE, CreateDoctorSchedule, CreateForcedBlock,
    CreateScheduleOverride, DEACTIVATE_DOCTOR_SCHEDULE, DECLARE_EMERGENCY_UNAVAILABILITY,
    DECLARE_HOLIDAY, DeclareEmergencyUnavailability, DeclareHoliday, LIFT_FORCED_BLOCK,
    REJECT_LEAVE_REQUEST, RESOLVE_EMERGENCY_UNAVAILABILITY, ReviewLeaveRequest,
    SUBMIT_LEAVE_REQUEST, SubmitLeaveRequest, UPDATE_DOCTOR_SCHEDULE, UpdateDoctorSchedule,
    WithReason,
};

/// Runs a pure validation, then records a missing doctor alongside its
/// errors so callers see every problem at once.
async fn with_doctor<T>(
    ctx: &HandlerContext<'_>,
    command: &Command,
    doctor_id: Uuid,
    decide: Result<T, DomainError>,
) -> Result<T, DomainError> {
    let (decided, mut errors) = match decide {
        Ok(value) => (Some(value), ValidationErrors::new()),
        Err(DomainError::Validation(errors)) => (None, errors),
        Err(e) => return Err(e),
    };
    require_reference(ctx, command, &mut errors, "doctor_id", doctor_id, AggregateType::DoctorProfile).await?;
    errors.into_result()?;
    decided.ok_or_else(|| DomainError::Infrastructure("validation produced no outcome".into()))
}

/// Handles `create_doctor_schedule`.
pub struct CreateDoctorScheduleHandler;

#[async_trait]
impl CommandHandler for CreateDoctorScheduleHandler {
    fn command_type(&self) -> &'static str {
        CREATE_DOCTOR_SCHEDULE
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: CreateDoctorSchedule = command.parse_payload()?;
        let schedule_id = new_aggregate_id(payload.schedule_id, command);
        let event = with_doctor(
            ctx,
            command,
            payload.doctor_id,
            DoctorSchedule::create(schedule_id, &payload),
        )
        .await?;
        ctx.ensure_new(schedule_id).await?;
        Ok(vec![command.draft(schedule_id, 1, &event)?])
    }
}

/// Handles `update_doctor_schedule`.
pub struct UpdateDoctorScheduleHandler;

#[async_trait]
impl CommandHandler for UpdateDoctorScheduleHandler {
    fn command_type(&self) -> &'static str {
        UPDATE_DOCTOR_SCHEDULE
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let schedule_id = command.require_aggregate_id()?;
        let payload: UpdateDoctorSchedule = command.parse_payload()?;
        let schedule: DoctorSchedule = load_aggregate(ctx.store, command.tenant_id(), schedule_id).await?;
        let event = schedule.update(&payload)?;
        next(command, &schedule, &event)
    }
}

/// Handles `deactivate_doctor_schedule`.
pub struct DeactivateDoctorScheduleHandler;

#[async_trait]
impl CommandHandler for DeactivateDoctorScheduleHandler {
    fn command_type(&self) -> &'static str {
        DEACTIVATE_DOCTOR_SCHEDULE
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let schedule_id = command.require_aggregate_id()?;
        let payload: WithReason = command.parse_payload()?;
        let schedule: DoctorSchedule = load_aggregate(ctx.store, command.tenant_id(), schedule_id).await?;
        let event = schedule.deactivate(payload.reason, ctx.clock.now())?;
        next(command, &schedule, &event)
    }
}

/// Handles `create_schedule_override`.
pub struct CreateScheduleOverrideHandler;

#[async_trait]
impl CommandHandler for CreateScheduleOverrideHandler {
    fn command_type(&self) -> &'static str {
        CREATE_SCHEDULE_OVERRIDE
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: CreateScheduleOverride = command.parse_payload()?;
        let override_id = new_aggregate_id(payload.override_id, command);
        let event = with_doctor(
            ctx,
            command,
            payload.doctor_id,
            ScheduleOverride::create(override_id, &payload),
        )
        .await?;
        ctx.ensure_new(override_id).await?;
        Ok(vec![command.draft(override_id, 1, &event)?])
    }
}

/// Handles `cancel_schedule_override`.
pub struct CancelScheduleOverrideHandler;

#[async_trait]
impl CommandHandler for CancelScheduleOverrideHandler {
    fn command_type(&self) -> &'static str {
        CANCEL_SCHEDULE_OVERRIDE
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let override_id = command.require_aggregate_id()?;
        let payload: WithReason = command.parse_payload()?;
        let found: ScheduleOverride = load_aggregate(ctx.store, command.tenant_id(), override_id).await?;
        let event = found.cancel(payload.reason, ctx.clock.now())?;
        next(command, &found, &event)
    }
}

/// Handles `submit_leave_request`.
pub struct SubmitLeaveRequestHandler;

#[async_trait]
impl CommandHandler for SubmitLeaveRequestHandler {
    fn command_type(&self) -> &'static str {
        SUBMIT_LEAVE_REQUEST
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: SubmitLeaveRequest = command.parse_payload()?;
        let leave_id = new_aggregate_id(payload.leave_id, command);
        let event = with_doctor(
            ctx,
            command,
            payload.doctor_id,
            LeaveRequest::submit(leave_id, &payload),
        )
        .await?;
        ctx.ensure_new(leave_id).await?;
        Ok(vec![command.draft(leave_id, 1, &event)?])
    }
}

async fn review_leave(
    command: &Command,
    ctx: &HandlerContext<'_>,
    approve: bool,
) -> Result<Vec<EventDraft>, DomainError> {
    let leave_id = command.require_aggregate_id()?;
    let payload: ReviewLeaveRequest = command.parse_payload()?;
    let leave: LeaveRequest = load_aggregate(ctx.store, command.tenant_id(), leave_id).await?;
    let event = leave.review(
        approve,
        command.metadata.actor_id,
        payload.note,
        ctx.clock.now(),
    )?;
    next(command, &leave, &event)
}

/// Handles `approve_leave_request`.
pub struct ApproveLeaveRequestHandler;

#[async_trait]
impl CommandHandler for ApproveLeaveRequestHandler {
    fn command_type(&self) -> &'static str {
        APPROVE_LEAVE_REQUEST
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        review_leave(command, ctx, true).await
    }
}

/// Handles `reject_leave_request`.
pub struct RejectLeaveRequestHandler;

#[async_trait]
impl CommandHandler for RejectLeaveRequestHandler {
    fn command_type(&self) -> &'static str {
        REJECT_LEAVE_REQUEST
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        review_leave(command, ctx, false).await
    }
}

/// Handles `declare_holiday`.
pub struct DeclareHolidayHandler;

#[async_trait]
impl CommandHandler for DeclareHolidayHandler {
    fn command_type(&self) -> &'static str {
        DECLARE_HOLIDAY
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: DeclareHoliday = command.parse_payload()?;
        let holiday_id = new_aggregate_id(payload.holiday_id, command);
        let event = Holiday::declare(holiday_id, &payload)?;
        ctx.ensure_new(holiday_id).await?;
        Ok(vec![command.draft(holiday_id, 1, &event)?])
    }
}

/// Handles `cancel_holiday`.
pub struct CancelHolidayHandler;

#[async_trait]
impl CommandHandler for CancelHolidayHandler {
    fn command_type(&self) -> &'static str {
        CANCEL_HOLIDAY
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let holiday_id = command.require_aggregate_id()?;
        let payload: WithReason = command.parse_payload()?;
        let holiday: Holiday = load_aggregate(ctx.store, command.tenant_id(), holiday_id).await?;
        let event = holiday.cancel(payload.reason, ctx.clock.now())?;
        next(command, &holiday, &event)
    }
}

/// Handles `declare_emergency_unavailability`.
pub struct DeclareEmergencyUnavailabilityHandler;

#[async_trait]
impl CommandHandler for DeclareEmergencyUnavailabilityHandler {
    fn command_type(&self) -> &'static str {
        DECLARE_EMERGENCY_UNAVAILABILITY
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: DeclareEmergencyUnavailability = command.parse_payload()?;
        let emergency_id = new_aggregate_id(payload.emergency_id, command);
        let event = with_doctor(
            ctx,
            command,
            payload.doctor_id,
            EmergencyUnavailability::declare(emergency_id, &payload),
        )
        .await?;
        ctx.ensure_new(emergency_id).await?;
        Ok(vec![command.draft(emergency_id, 1, &event)?])
    }
}

/// Handles `resolve_emergency_unavailability`.
pub struct ResolveEmergencyUnavailabilityHandler;

#[async_trait]
impl CommandHandler for ResolveEmergencyUnavailabilityHandler {
    fn command_type(&self) -> &'static str {
        RESOLVE_EMERGENCY_UNAVAILABILITY
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let emergency_id = command.require_aggregate_id()?;
        let payload: WithReason = command.parse_payload()?;
        let emergency: EmergencyUnavailability =
            load_aggregate(ctx.store, command.tenant_id(), emergency_id).await?;
        let event = emergency.resolve(payload.reason, ctx.clock.now())?;
        next(command, &emergency, &event)
    }
}

/// Handles `create_forced_block`.
pub struct CreateForcedBlockHandler;

#[async_trait]
impl CommandHandler for CreateForcedBlockHandler {
    fn command_type(&self) -> &'static str {
        CREATE_FORCED_BLOCK
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: CreateForcedBlock = command.parse_payload()?;
        let block_id = new_aggregate_id(payload.block_id, command);
        let decided = ForcedBlock::create(block_id, &payload);
        let event = match payload.doctor_id {
            Some(doctor_id) => with_doctor(ctx, command, doctor_id, decided).await?,
            None => decided?,
        };
        ctx.ensure_new(block_id).await?;
        Ok(vec![command.draft(block_id, 1, &event)?])
    }
}

/// Handles `lift_forced_block`.
pub struct LiftForcedBlockHandler;

#[async_trait]
impl CommandHandler for LiftForcedBlockHandler {
    fn command_type(&self) -> &'static str {
        LIFT_FORCED_BLOCK
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let block_id = command.require_aggregate_id()?;
        let payload: WithReason = command.parse_payload()?;
        let block: ForcedBlock = load_aggregate(ctx.store, command.tenant_id(), block_id).await?;
        let event = block.lift(payload.reason, ctx.clock.now())?;
        next(command, &block, &event)
    }
}
