//! Slot generation engine.
//!
//! Reads a doctor's availability inputs from the read models, plans slots
//! with [`crate::domain::slot_planning`] and records them through the command
//! bus as one `generate_slots` (or `regenerate_slots`) command, so generated
//! slots reach the read side through the same log and projection path as
//! every other change.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use clinicops_command_bus::CommandBus;
use clinicops_core::command::{Command, CommandMetadata};
use clinicops_core::error::{DomainError, ValidationErrors};
use clinicops_core::read_model::{ReadModelStore, ReadModelTable, RowFilter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{info, instrument};
use uuid::Uuid;

use super::query_handlers::{get_doctor_profile, list_active_holds, list_slots_for_doctor};
use crate::domain::aggregates::{DoctorStatus, SlotStatus};
use crate::domain::commands::{
    GENERATE_SLOTS, GenerateSlots, REGENERATE_SLOTS, RegenerateSlots, SlotWithdrawal,
};
use crate::domain::events::GeneratedSlot;
use crate::domain::read_models::{
    DoctorScheduleRow, EmergencyUnavailabilityRow, ForcedBlockRow, HolidayRow, LeaveRequestRow,
    ScheduleOverrideRow,
};
use crate::domain::slot_planning::{
    BaseSchedule, DateOverride, DateSpan, MAX_GENERATION_DAYS, ScheduleInputs, plan_slots,
};

/// Result of a regeneration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RegenerationOutcome {
    /// Slots withdrawn.
    pub withdrawn: usize,
    /// Slots created.
    pub generated: usize,
}

/// Turns availability inputs into slots.
pub struct SlotGenerationEngine {
    bus: Arc<CommandBus>,
    read_models: Arc<dyn ReadModelStore>,
}

impl SlotGenerationEngine {
    /// Creates an engine that dispatches through `bus`.
    #[must_use]
    pub fn new(bus: Arc<CommandBus>, read_models: Arc<dyn ReadModelStore>) -> Self {
        Self { bus, read_models }
    }

    /// Generates every missing slot for a doctor in `from..=to` and returns
    /// how many were created. Existing non-withdrawn slots at the same date
    /// and start time are left alone.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for an invalid range or a doctor who
    /// is not bookable, `DomainError::NotFound` for an unknown doctor, and
    /// any error of the `generate_slots` command.
    #[instrument(skip(self), fields(%tenant_id, %doctor_id, %from, %to))]
    pub async fn generate_slots_for_doctor(
        &self,
        tenant_id: Uuid,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<usize, DomainError> {
        let span = checked_span(from, to)?;
        let inputs = self.schedule_inputs(tenant_id, doctor_id).await?;
        let existing =
            list_slots_for_doctor(self.read_models.as_ref(), tenant_id, doctor_id, from, to).await?;
        let taken: HashSet<(NaiveDate, NaiveTime)> = existing
            .iter()
            .filter(|s| s.row.status != SlotStatus::Withdrawn)
            .map(|s| (s.row.date, s.row.start_time))
            .collect();

        let slots = fresh_slots(span, &inputs, &taken);
        let count = slots.len();
        if count == 0 {
            info!("no slots to generate");
            return Ok(0);
        }
        let payload = GenerateSlots {
            run_id: None,
            doctor_id,
            from_date: from,
            to_date: to,
            slots,
        };
        self.dispatch(tenant_id, GENERATE_SLOTS, &payload).await?;
        info!(count, "slots generated");
        Ok(count)
    }

    /// Withdraws future slots in `from..=to` that nobody has booked or holds,
    /// then generates replacements from the current inputs in the same
    /// command. Booked and held slots are left untouched.
    ///
    /// # Errors
    ///
    /// As [`Self::generate_slots_for_doctor`]; a slot that changed since it
    /// was read fails the whole command with `ConcurrencyConflict`.
    #[instrument(skip(self), fields(%tenant_id, %doctor_id, %from, %to))]
    pub async fn regenerate_slots_for_doctor(
        &self,
        tenant_id: Uuid,
        doctor_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<RegenerationOutcome, DomainError> {
        let span = checked_span(from, to)?;
        let inputs = self.schedule_inputs(tenant_id, doctor_id).await?;
        let now = self.bus.clock().now();
        let store = self.read_models.as_ref();
        let existing = list_slots_for_doctor(store, tenant_id, doctor_id, from, to).await?;
        let held: HashSet<Uuid> = list_active_holds(store, tenant_id, None, now)
            .await?
            .into_iter()
            .map(|h| h.row.slot_id)
            .collect();

        let mut withdrawals = Vec::new();
        let mut taken = HashSet::new();
        for slot in existing.iter().filter(|s| s.row.status != SlotStatus::Withdrawn) {
            let row = &slot.row;
            let withdrawable = row.current_bookings == 0
                && !held.contains(&row.slot_id)
                && row.date.and_time(row.start_time).and_utc() > now;
            if withdrawable {
                withdrawals.push(SlotWithdrawal {
                    slot_id: row.slot_id,
                    generation_run_id: row.generation_run_id,
                    expected_version: slot.version,
                });
            } else {
                taken.insert((row.date, row.start_time));
            }
        }

        let slots = fresh_slots(span, &inputs, &taken);
        let outcome = RegenerationOutcome {
            withdrawn: withdrawals.len(),
            generated: slots.len(),
        };
        if outcome.withdrawn == 0 && outcome.generated == 0 {
            info!("nothing to regenerate");
            return Ok(outcome);
        }
        let payload = RegenerateSlots {
            generate: GenerateSlots {
                run_id: None,
                doctor_id,
                from_date: from,
                to_date: to,
                slots,
            },
            withdrawals,
        };
        self.dispatch(tenant_id, REGENERATE_SLOTS, &payload).await?;
        info!(
            withdrawn = outcome.withdrawn,
            generated = outcome.generated,
            "slots regenerated"
        );
        Ok(outcome)
    }

    async fn dispatch<P: Serialize>(
        &self,
        tenant_id: Uuid,
        command_type: &str,
        payload: &P,
    ) -> Result<(), DomainError> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| DomainError::Infrastructure(format!("payload serialization failed: {e}")))?;
        let command = Command::new(command_type, CommandMetadata::system(tenant_id), payload);
        self.bus.handle(command).await?;
        Ok(())
    }

    /// Gathers the availability records in force for a bookable doctor.
    async fn schedule_inputs(
        &self,
        tenant_id: Uuid,
        doctor_id: Uuid,
    ) -> Result<ScheduleInputs, DomainError> {
        let profile = get_doctor_profile(self.read_models.as_ref(), tenant_id, doctor_id).await?;
        if profile.row.status != DoctorStatus::Active || !profile.row.is_bookable {
            return Err(DomainError::invalid("doctor_id", "doctor is not bookable"));
        }
        let hospital_id = profile.row.hospital_id;
        let doctor = doctor_id.to_string();

        let schedules: Vec<DoctorScheduleRow> = self
            .active(ReadModelTable::DoctorSchedules, tenant_id, "doctor_id", &doctor, "active")
            .await?;
        let overrides: Vec<ScheduleOverrideRow> = self
            .active(ReadModelTable::ScheduleOverrides, tenant_id, "doctor_id", &doctor, "active")
            .await?;
        let leaves: Vec<LeaveRequestRow> = self
            .active(ReadModelTable::LeaveRequests, tenant_id, "doctor_id", &doctor, "approved")
            .await?;
        let holidays: Vec<HolidayRow> = self
            .active(ReadModelTable::Holidays, tenant_id, "hospital_id", &hospital_id.to_string(), "active")
            .await?;
        let emergencies: Vec<EmergencyUnavailabilityRow> = self
            .active(ReadModelTable::EmergencyUnavailability, tenant_id, "doctor_id", &doctor, "active")
            .await?;
        let mut blocks: Vec<ForcedBlockRow> = self
            .active(ReadModelTable::ForcedBlocks, tenant_id, "doctor_id", &doctor, "active")
            .await?;
        blocks.extend(
            self.active::<ForcedBlockRow>(
                ReadModelTable::ForcedBlocks,
                tenant_id,
                "hospital_id",
                &hospital_id.to_string(),
                "active",
            )
            .await?,
        );

        Ok(ScheduleInputs {
            forced_blocks: blocks
                .iter()
                .map(|b| DateSpan {
                    start_date: b.start_date,
                    end_date: b.end_date,
                })
                .collect(),
            emergencies: emergencies
                .iter()
                .map(|e| DateSpan {
                    start_date: e.start_date,
                    end_date: e.end_date,
                })
                .collect(),
            leaves: leaves
                .iter()
                .map(|l| DateSpan {
                    start_date: l.start_date,
                    end_date: l.end_date,
                })
                .collect(),
            holidays: holidays.iter().map(|h| h.date).collect(),
            overrides: overrides
                .into_iter()
                .map(|o| DateOverride {
                    date: o.date,
                    window: o.window.filter(|_| o.is_available),
                })
                .collect(),
            base_schedules: schedules
                .into_iter()
                .map(|s| BaseSchedule {
                    day_of_week: s.day_of_week,
                    window: s.window,
                    effective_from: s.effective_from,
                    effective_until: s.effective_until,
                })
                .collect(),
        })
    }

    async fn active<T: DeserializeOwned>(
        &self,
        table: ReadModelTable,
        tenant_id: Uuid,
        owner_field: &str,
        owner: &str,
        status: &str,
    ) -> Result<Vec<T>, DomainError> {
        let filter = RowFilter::for_tenant(tenant_id)
            .field(owner_field, owner)
            .field("status", status);
        self.read_models
            .find(table, &filter)
            .await?
            .iter()
            .map(|row| row.decode())
            .collect()
    }
}

fn checked_span(from: NaiveDate, to: NaiveDate) -> Result<DateSpan, DomainError> {
    let span = DateSpan {
        start_date: from,
        end_date: to,
    };
    let mut errors = ValidationErrors::new();
    span.check(&mut errors);
    errors.check(
        span.days() <= MAX_GENERATION_DAYS,
        "to_date",
        "range must not exceed 366 days",
    );
    errors.into_result()?;
    Ok(span)
}

fn fresh_slots(
    span: DateSpan,
    inputs: &ScheduleInputs,
    taken: &HashSet<(NaiveDate, NaiveTime)>,
) -> Vec<GeneratedSlot> {
    plan_slots(span, inputs)
        .into_iter()
        .filter(|p| !taken.contains(&(p.date, p.start_time)))
        .map(|p| GeneratedSlot {
            slot_id: Uuid::new_v4(),
            date: p.date,
            start_time: p.start_time,
            end_time: p.end_time,
            duration_minutes: p.duration_minutes,
            consultation_mode: p.consultation_mode,
            max_capacity: p.max_capacity,
            location_id: p.location_id,
            schedule_source: p.schedule_source,
        })
        .collect()
}
