//! Query handlers for the Patients & Visits context.
//!
//! Queries read the projected `patients` and `visits` tables and return
//! typed views.

use clinicops_core::error::DomainError;
use clinicops_core::read_model::{ReadModelStore, ReadModelTable, RowFilter, View, get_view};
use uuid::Uuid;

use crate::domain::read_models::{PatientRow, VisitRow};

/// Retrieves a patient by id.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the row is absent or owned by another
/// tenant.
pub async fn get_patient(
    store: &dyn ReadModelStore,
    tenant_id: Uuid,
    patient_id: Uuid,
) -> Result<View<PatientRow>, DomainError> {
    get_view(store, ReadModelTable::Patients, tenant_id, patient_id).await
}

/// Looks a patient up by medical record number.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if no patient carries the MRN.
pub async fn find_patient_by_mrn(
    store: &dyn ReadModelStore,
    tenant_id: Uuid,
    mrn: &str,
) -> Result<View<PatientRow>, DomainError> {
    let rows = store
        .find(
            ReadModelTable::Patients,
            &RowFilter::for_tenant(tenant_id).field("mrn", mrn).page(1, 0),
        )
        .await?;
    let row = rows
        .first()
        .ok_or_else(|| DomainError::not_found("patient", mrn))?;
    View::from_row(row)
}

/// Retrieves a visit by id.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the row is absent or owned by another
/// tenant.
pub async fn get_visit(
    store: &dyn ReadModelStore,
    tenant_id: Uuid,
    visit_id: Uuid,
) -> Result<View<VisitRow>, DomainError> {
    get_view(store, ReadModelTable::Visits, tenant_id, visit_id).await
}

/// Lists a patient's visits, oldest first.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the store fails or a row does
/// not decode.
pub async fn list_visits_for_patient(
    store: &dyn ReadModelStore,
    tenant_id: Uuid,
    patient_id: Uuid,
) -> Result<Vec<View<VisitRow>>, DomainError> {
    let rows = store
        .find(
            ReadModelTable::Visits,
            &RowFilter::for_tenant(tenant_id).field("patient_id", patient_id.to_string()),
        )
        .await?;
    rows.iter().map(View::from_row).collect()
}
