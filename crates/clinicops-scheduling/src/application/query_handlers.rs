//! Query handlers for the Scheduling context.

use chrono::{DateTime, NaiveDate, Utc};
use clinicops_core::error::DomainError;
use clinicops_core::read_model::{ReadModelStore, ReadModelTable, RowFilter, View, get_view};
use uuid::Uuid;

use crate::domain::read_models::{
    AppointmentRow, AppointmentSlotRow, DoctorProfileRow, TentativeHoldRow,
};

/// Retrieves a doctor profile.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the row is absent or owned by another
/// tenant.
pub async fn get_doctor_profile(
    store: &dyn ReadModelStore,
    tenant_id: Uuid,
    doctor_id: Uuid,
) -> Result<View<DoctorProfileRow>, DomainError> {
    get_view(store, ReadModelTable::DoctorProfiles, tenant_id, doctor_id).await
}

/// Retrieves one slot.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the row is absent or owned by another
/// tenant.
pub async fn get_slot(
    store: &dyn ReadModelStore,
    tenant_id: Uuid,
    slot_id: Uuid,
) -> Result<View<AppointmentSlotRow>, DomainError> {
    get_view(store, ReadModelTable::AppointmentSlots, tenant_id, slot_id).await
}

/// Retrieves one appointment.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the row is absent or owned by another
/// tenant.
pub async fn get_appointment(
    store: &dyn ReadModelStore,
    tenant_id: Uuid,
    appointment_id: Uuid,
) -> Result<View<AppointmentRow>, DomainError> {
    get_view(store, ReadModelTable::Appointments, tenant_id, appointment_id).await
}

/// A doctor's slots dated within `from..=to`, in calendar order.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the store fails or a row does
/// not decode.
pub async fn list_slots_for_doctor(
    store: &dyn ReadModelStore,
    tenant_id: Uuid,
    doctor_id: Uuid,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<View<AppointmentSlotRow>>, DomainError> {
    let rows = store
        .find(
            ReadModelTable::AppointmentSlots,
            &RowFilter::for_tenant(tenant_id)
                .field("doctor_id", doctor_id.to_string())
                .at_least("date", from)
                .at_most("date", to),
        )
        .await?;
    let mut slots = rows
        .iter()
        .map(View::<AppointmentSlotRow>::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    slots.sort_by_key(|s| (s.row.date, s.row.start_time));
    Ok(slots)
}

/// Holds still excluding others at `now`, optionally for one slot.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the store fails or a row does
/// not decode.
pub async fn list_active_holds(
    store: &dyn ReadModelStore,
    tenant_id: Uuid,
    slot_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Vec<View<TentativeHoldRow>>, DomainError> {
    let mut filter = RowFilter::for_tenant(tenant_id).field("status", "active");
    if let Some(slot_id) = slot_id {
        filter = filter.field("slot_id", slot_id.to_string());
    }
    let rows = store.find(ReadModelTable::TentativeHolds, &filter).await?;
    let mut holds = rows
        .iter()
        .map(View::<TentativeHoldRow>::from_row)
        .collect::<Result<Vec<_>, _>>()?;
    holds.retain(|h| h.row.is_live(now));
    Ok(holds)
}

/// One page of active holds whose expiry has passed at `now`, across all
/// tenants, oldest first. Each entry carries the owning tenant.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the store fails or a row does
/// not decode.
pub async fn list_expired_holds(
    store: &dyn ReadModelStore,
    now: DateTime<Utc>,
    limit: i64,
    offset: i64,
) -> Result<Vec<(Uuid, TentativeHoldRow)>, DomainError> {
    let rows = store
        .find(
            ReadModelTable::TentativeHolds,
            &RowFilter::default()
                .field("status", "active")
                .at_most("expires_at", now)
                .page(limit, offset),
        )
        .await?;
    rows.iter()
        .map(|row| Ok((row.tenant_id, row.decode::<TentativeHoldRow>()?)))
        .collect()
}
