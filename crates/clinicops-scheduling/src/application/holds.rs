//! Tentative holds on slots and their periodic expiry sweep.

use std::sync::Arc;
use std::time::Duration;

use clinicops_command_bus::CommandBus;
use clinicops_core::aggregate::load_aggregate;
use clinicops_core::command::{Command, CommandMetadata, CommandResult};
use clinicops_core::error::DomainError;
use clinicops_core::read_model::ReadModelStore;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::query_handlers::{get_slot, list_active_holds, list_expired_holds};
use crate::domain::aggregates::AppointmentSlot;
use crate::domain::commands::{
    EXPIRE_HOLD, ExpireHold, PLACE_HOLD, PlaceHold, RELEASE_HOLD, ReleaseHold,
};
use crate::domain::read_models::TentativeHoldRow;
use crate::domain::slot_planning::HoldType;

/// Expired holds handled per sweep.
pub const SWEEP_BATCH_SIZE: i64 = 100;

/// A placed hold and the command result that recorded it.
#[derive(Debug, Clone)]
pub struct HoldPlacement {
    pub hold_id: Uuid,
    pub result: CommandResult,
}

/// A hold request as received from a caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoldRequest {
    pub holder_id: Uuid,
    pub patient_id: Option<Uuid>,
    pub hold_type: HoldType,
    pub ttl_minutes: Option<u32>,
}

/// Places, releases and expires holds through the command bus.
pub struct HoldEngine {
    bus: Arc<CommandBus>,
    read_models: Arc<dyn ReadModelStore>,
}

impl HoldEngine {
    #[must_use]
    pub fn new(bus: Arc<CommandBus>, read_models: Arc<dyn ReadModelStore>) -> Self {
        Self { bus, read_models }
    }

    /// Returns `true` if no live hold exists for the slot.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown slot.
    pub async fn is_slot_available(&self, tenant_id: Uuid, slot_id: Uuid) -> Result<bool, DomainError> {
        get_slot(self.read_models.as_ref(), tenant_id, slot_id).await?;
        let now = self.bus.clock().now();
        let holds = list_active_holds(self.read_models.as_ref(), tenant_id, Some(slot_id), now).await?;
        Ok(holds.is_empty())
    }

    /// Places a hold on a slot.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown slot and any error of
    /// the `place_hold` command, including a validation error while another
    /// hold is live.
    #[instrument(skip(self, request), fields(%tenant_id, %slot_id))]
    pub async fn place_hold(
        &self,
        tenant_id: Uuid,
        slot_id: Uuid,
        request: HoldRequest,
        metadata: CommandMetadata,
    ) -> Result<HoldPlacement, DomainError> {
        let slot = get_slot(self.read_models.as_ref(), tenant_id, slot_id).await?;
        let hold_id = Uuid::new_v4();
        let payload = PlaceHold {
            hold_id: Some(hold_id),
            generation_run_id: slot.row.generation_run_id,
            holder_id: request.holder_id,
            patient_id: request.patient_id,
            hold_type: request.hold_type,
            ttl_minutes: request.ttl_minutes,
        };
        let result = self.dispatch(PLACE_HOLD, slot_id, metadata, &payload).await?;
        info!(%hold_id, "hold placed");
        Ok(HoldPlacement { hold_id, result })
    }

    /// Releases a hold before its expiry.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::NotFound` for an unknown slot and any error of
    /// the `release_hold` command.
    #[instrument(skip(self, reason, metadata), fields(%tenant_id, %slot_id, %hold_id))]
    pub async fn release_hold(
        &self,
        tenant_id: Uuid,
        slot_id: Uuid,
        hold_id: Uuid,
        reason: Option<String>,
        metadata: CommandMetadata,
    ) -> Result<CommandResult, DomainError> {
        let slot = get_slot(self.read_models.as_ref(), tenant_id, slot_id).await?;
        let payload = ReleaseHold {
            hold_id,
            generation_run_id: slot.row.generation_run_id,
            reason,
        };
        let result = self.dispatch(RELEASE_HOLD, slot_id, metadata, &payload).await?;
        info!("hold released");
        Ok(result)
    }

    /// Expires up to `limit` holds whose lifetime has passed, across all
    /// tenants, and returns how many were expired.
    ///
    /// Candidates are read in pages of `limit`. A hold that cannot be
    /// expired is logged and the sweep moves on to the next page, so rows
    /// that keep failing never starve the ones behind them.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the hold read model cannot
    /// be read.
    #[instrument(skip(self))]
    pub async fn sweep_expired_holds(&self, limit: i64) -> Result<usize, DomainError> {
        let Ok(target) = usize::try_from(limit) else {
            return Ok(0);
        };
        if target == 0 {
            return Ok(0);
        }
        let now = self.bus.clock().now();
        let mut expired = 0;
        let mut offset = 0;
        loop {
            let page = list_expired_holds(self.read_models.as_ref(), now, limit, offset).await?;
            let fetched = page.len();
            for (tenant_id, hold) in page {
                match self.expire_one(tenant_id, &hold).await {
                    Ok(true) => expired += 1,
                    Ok(false) => {}
                    Err(e) => warn!(
                        hold_id = %hold.hold_id,
                        slot_id = %hold.slot_id,
                        error = %e,
                        "skipped expiring hold"
                    ),
                }
                if expired == target {
                    return Ok(expired);
                }
            }
            if fetched < target {
                return Ok(expired);
            }
            offset += limit;
        }
    }

    /// Expires one hold row if its slot still records it. Returns `false`
    /// when the slot has already moved on and the row only awaits its
    /// projection.
    async fn expire_one(&self, tenant_id: Uuid, hold: &TentativeHoldRow) -> Result<bool, DomainError> {
        let ledger: AppointmentSlot =
            load_aggregate(self.bus.store().as_ref(), tenant_id, hold.slot_id).await?;
        if ledger.active_hold.as_ref().map(|h| h.hold_id) != Some(hold.hold_id) {
            warn!(
                hold_id = %hold.hold_id,
                slot_id = %hold.slot_id,
                current_hold_id = ?ledger.active_hold.as_ref().map(|h| h.hold_id),
                "skipped expiring hold: slot no longer records it, read model is behind"
            );
            return Ok(false);
        }
        let slot = get_slot(self.read_models.as_ref(), tenant_id, hold.slot_id).await?;
        let payload = ExpireHold {
            hold_id: hold.hold_id,
            generation_run_id: slot.row.generation_run_id,
        };
        self.dispatch(EXPIRE_HOLD, hold.slot_id, CommandMetadata::system(tenant_id), &payload)
            .await?;
        Ok(true)
    }

    async fn dispatch<P: Serialize>(
        &self,
        command_type: &str,
        slot_id: Uuid,
        metadata: CommandMetadata,
        payload: &P,
    ) -> Result<CommandResult, DomainError> {
        let payload = serde_json::to_value(payload)
            .map_err(|e| DomainError::Infrastructure(format!("payload serialization failed: {e}")))?;
        let command = Command::new(command_type, metadata, payload).for_aggregate(slot_id);
        self.bus.handle(command).await
    }
}

/// Runs [`HoldEngine::sweep_expired_holds`] on a fixed interval.
pub struct HoldSweeper {
    engine: Arc<HoldEngine>,
    interval: Duration,
}

impl HoldSweeper {
    #[must_use]
    pub fn new(engine: Arc<HoldEngine>, interval: Duration) -> Self {
        Self { engine, interval }
    }

    /// Sweeps until `shutdown` turns `true`. A sweep in progress completes
    /// before the loop exits.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis(), "hold sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.engine.sweep_expired_holds(SWEEP_BATCH_SIZE).await {
                        Ok(0) => {}
                        Ok(expired) => info!(expired, "expired holds swept"),
                        Err(e) => error!(error = %e, "hold sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("hold sweeper received stop signal");
                        break;
                    }
                }
            }
        }
        info!("hold sweeper stopped");
    }

    /// Starts the sweeper on the runtime.
    #[must_use]
    pub fn spawn(self) -> SweeperHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let join = tokio::spawn(self.run(stop_rx));
        SweeperHandle { stop_tx, join }
    }
}

/// Stops a spawned [`HoldSweeper`].
pub struct SweeperHandle {
    stop_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signals the sweeper and waits up to `timeout` for it to finish.
    /// Returns `false` if it had to be aborted.
    pub async fn stop(self, timeout: Duration) -> bool {
        let _ = self.stop_tx.send(true);
        let mut join = self.join;
        match tokio::time::timeout(timeout, &mut join).await {
            Ok(_) => true,
            Err(_) => {
                warn!(timeout_ms = timeout.as_millis(), "hold sweeper did not stop in time");
                join.abort();
                false
            }
        }
    }
}
