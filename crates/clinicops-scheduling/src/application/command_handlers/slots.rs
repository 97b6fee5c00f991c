use async_trait::async_trait;
use clinicops_core::aggregate::load_aggregate;
use clinicops_core::command::{Command, CommandHandler, HandlerContext};
use clinicops_core::error::{DomainError, ValidationErrors};
use clinicops_core::event::EventDraft;
use uuid::Uuid;

use super::{LoadedSlot, load_slot, new_aggregate_id, slot_drafts};
use crate::domain::aggregates::DoctorProfile;
use crate::domain::commands::{
    BLOCK_SLOT, EXPIRE_HOLD, ExpireHold, GENERATE_SLOTS, GenerateSlots, PLACE_HOLD, PlaceHold,
    REGENERATE_SLOTS, RELEASE_HOLD, RegenerateSlots, ReleaseHold, SlotAdministration, UNBLOCK_SLOT,
};
use crate::domain::events::{SlotGenerationEvent, SlotsGenerated};
use crate::domain::slot_planning::{DateSpan, MAX_GENERATION_DAYS};

/// Validates a generation payload and drafts its `slots_generated` event.
/// Returns no draft when the payload carries no slots.
async fn draft_generation(
    command: &Command,
    ctx: &HandlerContext<'_>,
    payload: &GenerateSlots,
    require_slots: bool,
) -> Result<Option<EventDraft>, DomainError> {
    let mut errors = ValidationErrors::new();
    let span = DateSpan {
        start_date: payload.from_date,
        end_date: payload.to_date,
    };
    span.check(&mut errors);
    errors.check(
        span.days() <= MAX_GENERATION_DAYS,
        "to_date",
        "range must not exceed 366 days",
    );
    match load_aggregate::<DoctorProfile>(ctx.store, command.tenant_id(), payload.doctor_id).await {
        Ok(profile) => errors.check(
            profile.accepts_bookings(),
            "doctor_id",
            "doctor is not bookable",
        ),
        Err(DomainError::AggregateNotFound(_)) => errors.push("doctor_id", "doctor does not exist"),
        Err(e) => return Err(e),
    }
    if require_slots {
        errors.check(!payload.slots.is_empty(), "slots", "must not be empty");
    }
    errors.check(
        payload.slots.iter().all(|s| span.covers(s.date)),
        "slots",
        "every slot must fall inside the date range",
    );
    errors.into_result()?;

    if payload.slots.is_empty() {
        return Ok(None);
    }
    let run_id = new_aggregate_id(payload.run_id, command);
    ctx.ensure_new(run_id).await?;
    let event = SlotGenerationEvent::SlotsGenerated(SlotsGenerated {
        run_id,
        doctor_id: payload.doctor_id,
        from_date: payload.from_date,
        to_date: payload.to_date,
        slots: payload.slots.clone(),
        generated_at: ctx.clock.now(),
    });
    Ok(Some(command.draft(run_id, 1, &event)?))
}

/// Handles `generate_slots`.
pub struct GenerateSlotsHandler;

#[async_trait]
impl CommandHandler for GenerateSlotsHandler {
    fn command_type(&self) -> &'static str {
        GENERATE_SLOTS
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: GenerateSlots = command.parse_payload()?;
        let draft = draft_generation(command, ctx, &payload, true).await?;
        Ok(draft.into_iter().collect())
    }
}

/// Handles `regenerate_slots`: withdraws the listed slots and records the
/// replacement run in one append.
pub struct RegenerateSlotsHandler;

#[async_trait]
impl CommandHandler for RegenerateSlotsHandler {
    fn command_type(&self) -> &'static str {
        REGENERATE_SLOTS
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let payload: RegenerateSlots = command.parse_payload()?;
        if payload.generate.slots.is_empty() && payload.withdrawals.is_empty() {
            return Err(DomainError::invalid("slots", "nothing to regenerate"));
        }
        let mut drafts: Vec<EventDraft> = draft_generation(command, ctx, &payload.generate, false)
            .await?
            .into_iter()
            .collect();

        let now = ctx.clock.now();
        for withdrawal in &payload.withdrawals {
            let LoadedSlot {
                doctor_id,
                planned,
                ledger,
            } = load_slot(ctx, command.tenant_id(), withdrawal.generation_run_id, withdrawal.slot_id)
                .await?;
            if doctor_id != payload.generate.doctor_id {
                return Err(DomainError::invalid(
                    "withdrawals",
                    format!("slot {} belongs to another doctor", withdrawal.slot_id),
                ));
            }
            if ledger.version != withdrawal.expected_version {
                return Err(DomainError::ConcurrencyConflict {
                    aggregate_id: withdrawal.slot_id,
                    expected: withdrawal.expected_version,
                    actual: ledger.version,
                });
            }
            let withdrawn = ledger.withdraw(&planned, now)?;
            let events = ledger.lapse_expired(now).into_iter().chain([withdrawn]);
            drafts.extend(slot_drafts(command, &ledger, events)?);
        }
        Ok(drafts)
    }
}

/// Handles `place_hold`.
pub struct PlaceHoldHandler;

#[async_trait]
impl CommandHandler for PlaceHoldHandler {
    fn command_type(&self) -> &'static str {
        PLACE_HOLD
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let slot_id = command.require_aggregate_id()?;
        let payload: PlaceHold = command.parse_payload()?;
        let loaded = load_slot(ctx, command.tenant_id(), payload.generation_run_id, slot_id).await?;
        let now = ctx.clock.now();
        let hold_id = payload.hold_id.unwrap_or_else(Uuid::new_v4);
        let placed = loaded.ledger.place_hold(&loaded.planned, hold_id, &payload, now)?;
        let events = loaded.ledger.lapse_expired(now).into_iter().chain([placed]);
        slot_drafts(command, &loaded.ledger, events)
    }
}

/// Handles `release_hold`.
pub struct ReleaseHoldHandler;

#[async_trait]
impl CommandHandler for ReleaseHoldHandler {
    fn command_type(&self) -> &'static str {
        RELEASE_HOLD
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let slot_id = command.require_aggregate_id()?;
        let payload: ReleaseHold = command.parse_payload()?;
        let loaded = load_slot(ctx, command.tenant_id(), payload.generation_run_id, slot_id).await?;
        let event = loaded
            .ledger
            .release_hold(payload.hold_id, payload.reason, ctx.clock.now())?;
        slot_drafts(command, &loaded.ledger, [event])
    }
}

/// Handles `expire_hold`.
pub struct ExpireHoldHandler;

#[async_trait]
impl CommandHandler for ExpireHoldHandler {
    fn command_type(&self) -> &'static str {
        EXPIRE_HOLD
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let slot_id = command.require_aggregate_id()?;
        let payload: ExpireHold = command.parse_payload()?;
        let loaded = load_slot(ctx, command.tenant_id(), payload.generation_run_id, slot_id).await?;
        let event = loaded.ledger.expire_hold(payload.hold_id, ctx.clock.now())?;
        slot_drafts(command, &loaded.ledger, [event])
    }
}

/// Handles `block_slot`.
pub struct BlockSlotHandler;

#[async_trait]
impl CommandHandler for BlockSlotHandler {
    fn command_type(&self) -> &'static str {
        BLOCK_SLOT
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let slot_id = command.require_aggregate_id()?;
        let payload: SlotAdministration = command.parse_payload()?;
        let loaded = load_slot(ctx, command.tenant_id(), payload.generation_run_id, slot_id).await?;
        let event = loaded.ledger.block(payload.reason, ctx.clock.now())?;
        slot_drafts(command, &loaded.ledger, [event])
    }
}

/// Handles `unblock_slot`.
pub struct UnblockSlotHandler;

#[async_trait]
impl CommandHandler for UnblockSlotHandler {
    fn command_type(&self) -> &'static str {
        UNBLOCK_SLOT
    }

    async fn handle(
        &self,
        command: &Command,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<EventDraft>, DomainError> {
        let slot_id = command.require_aggregate_id()?;
        let payload: SlotAdministration = command.parse_payload()?;
        let loaded = load_slot(ctx, command.tenant_id(), payload.generation_run_id, slot_id).await?;
        let event = loaded
            .ledger
            .unblock(&loaded.planned, payload.reason, ctx.clock.now())?;
        slot_drafts(command, &loaded.ledger, [event])
    }
}
