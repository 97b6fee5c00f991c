//! Read-model port.
//!
//! Read models are denormalized JSON rows keyed by the source aggregate id.
//! Only projection handlers write them, and every write carries the version
//! of the event that produced it so replays cannot regress a row.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Closed set of read-model tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadModelTable {
    /// Patient registry.
    Patients,
    /// Clinical visits.
    Visits,
    /// Booked appointments.
    Appointments,
    /// Doctor profiles.
    DoctorProfiles,
    /// Recurring weekly schedules.
    DoctorSchedules,
    /// Per-date schedule overrides.
    ScheduleOverrides,
    /// Leave requests.
    LeaveRequests,
    /// Hospital holidays.
    Holidays,
    /// Emergency unavailability windows.
    EmergencyUnavailability,
    /// Administrative forced blocks.
    ForcedBlocks,
    /// Generated appointment slots.
    AppointmentSlots,
    /// Tentative holds on slots.
    TentativeHolds,
}

impl ReadModelTable {
    /// Every table, in migration order.
    pub const ALL: [Self; 12] = [
        Self::Patients,
        Self::Visits,
        Self::Appointments,
        Self::DoctorProfiles,
        Self::DoctorSchedules,
        Self::ScheduleOverrides,
        Self::LeaveRequests,
        Self::Holidays,
        Self::EmergencyUnavailability,
        Self::ForcedBlocks,
        Self::AppointmentSlots,
        Self::TentativeHolds,
    ];

    /// SQL table name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patients => "patients",
            Self::Visits => "visits",
            Self::Appointments => "appointments",
            Self::DoctorProfiles => "doctor_profiles",
            Self::DoctorSchedules => "doctor_schedules",
            Self::ScheduleOverrides => "schedule_overrides",
            Self::LeaveRequests => "leave_requests",
            Self::Holidays => "holidays",
            Self::EmergencyUnavailability => "emergency_unavailability",
            Self::ForcedBlocks => "forced_blocks",
            Self::AppointmentSlots => "appointment_slots",
            Self::TentativeHolds => "tentative_holds",
        }
    }
}

impl fmt::Display for ReadModelTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadModelTable {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| DomainError::not_found("read model", s))
    }
}

/// One stored read-model row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadModelRow {
    /// Source aggregate id.
    pub id: Uuid,
    /// Owning tenant.
    pub tenant_id: Uuid,
    /// Denormalized view.
    pub data: serde_json::Value,
    /// Version of the last event applied.
    pub current_version: i64,
    /// Id of the last event applied.
    pub last_event_id: Uuid,
    /// Time of the first write.
    pub created_at: DateTime<Utc>,
    /// Time of the latest write.
    pub updated_at: DateTime<Utc>,
}

impl ReadModelRow {
    /// Decodes `data` into a typed view.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the row does not match `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, DomainError> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            DomainError::Infrastructure(format!("read model row {} does not decode: {e}", self.id))
        })
    }
}

/// A typed row plus the version of the last event applied to it.
#[derive(Debug, Clone, Serialize)]
pub struct View<T> {
    /// The typed row.
    #[serde(flatten)]
    pub row: T,
    /// Version of the last event applied.
    pub version: i64,
}

impl<T: DeserializeOwned> View<T> {
    /// Decodes a stored row.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the row does not match `T`.
    pub fn from_row(row: &ReadModelRow) -> Result<Self, DomainError> {
        Ok(Self {
            row: row.decode()?,
            version: row.current_version,
        })
    }
}

/// A partial update: only the present, non-null fields are merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(serde_json::Map<String, serde_json::Value>);

impl Patch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a patch from a struct of optional fields, dropping nulls.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if `value` does not serialize
    /// to a JSON object.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self, DomainError> {
        match serde_json::to_value(value) {
            Ok(serde_json::Value::Object(map)) => Ok(Self(
                map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            )),
            Ok(other) => Err(DomainError::Infrastructure(format!(
                "patch must be an object, got {other}"
            ))),
            Err(e) => Err(DomainError::Infrastructure(format!(
                "patch serialization failed: {e}"
            ))),
        }
    }

    /// Sets one field.
    #[must_use]
    pub fn set(mut self, field: &str, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(field.to_owned(), value.into());
        self
    }

    /// Returns `true` if nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The fields to merge.
    #[must_use]
    pub fn fields(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }

    /// Merges the patch into a JSON object in place.
    pub fn apply_to(&self, target: &mut serde_json::Value) {
        if let serde_json::Value::Object(map) = target {
            for (k, v) in &self.0 {
                map.insert(k.clone(), v.clone());
            }
        }
    }
}

/// Event that produced a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSource {
    /// Aggregate version of the event.
    pub version: i64,
    /// Event id.
    pub event_id: Uuid,
}

/// A single version-guarded read-model mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadModelWrite {
    /// Inserts the row, or replaces it if the stored version is lower.
    Insert {
        /// Target table.
        table: ReadModelTable,
        /// Full row (timestamps are taken from `updated_at` on replace).
        row: ReadModelRow,
    },
    /// Merges fields into an existing row if the stored version is lower.
    /// A missing row is left missing.
    Patch {
        /// Target table.
        table: ReadModelTable,
        /// Row id.
        id: Uuid,
        /// Fields to merge.
        patch: Patch,
        /// Event that produced the patch.
        source: RowSource,
        /// Write time.
        at: DateTime<Utc>,
    },
}

impl ReadModelWrite {
    /// Target table.
    #[must_use]
    pub fn table(&self) -> ReadModelTable {
        match self {
            Self::Insert { table, .. } | Self::Patch { table, .. } => *table,
        }
    }
}

/// Which side of a [`FieldRange`] the bound sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOp {
    /// Field value `>=` bound.
    AtLeast,
    /// Field value `<=` bound.
    AtMost,
}

/// Typed bound for a range constraint. Row fields are parsed as the same
/// type before comparing, so values are ordered chronologically rather than
/// as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeValue {
    /// ISO-8601 calendar date.
    Date(NaiveDate),
    /// RFC 3339 instant.
    Timestamp(DateTime<Utc>),
}

impl From<NaiveDate> for RangeValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<DateTime<Utc>> for RangeValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Inclusive bound on one `data` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRange {
    pub field: String,
    pub op: RangeOp,
    pub value: RangeValue,
}

impl FieldRange {
    /// Returns `true` if `data` carries the field and it lies on the right
    /// side of the bound. Missing or unparseable values never match.
    #[must_use]
    pub fn matches(&self, data: &serde_json::Value) -> bool {
        let Some(raw) = data.get(&self.field).and_then(serde_json::Value::as_str) else {
            return false;
        };
        let ordering = match self.value {
            RangeValue::Date(bound) => match raw.parse::<NaiveDate>() {
                Ok(actual) => actual.cmp(&bound),
                Err(_) => return false,
            },
            RangeValue::Timestamp(bound) => match DateTime::parse_from_rfc3339(raw) {
                Ok(actual) => actual.with_timezone(&Utc).cmp(&bound),
                Err(_) => return false,
            },
        };
        match self.op {
            RangeOp::AtLeast => ordering.is_ge(),
            RangeOp::AtMost => ordering.is_le(),
        }
    }
}

/// Query filter for [`ReadModelStore::find`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFilter {
    /// Restrict to one tenant.
    pub tenant_id: Option<Uuid>,
    /// JSON containment: every listed field must equal the given value.
    pub equals: serde_json::Map<String, serde_json::Value>,
    /// Inclusive bounds on date or timestamp fields.
    pub ranges: Vec<FieldRange>,
    /// Maximum rows returned.
    pub limit: Option<i64>,
    /// Rows skipped before the first returned.
    pub offset: Option<i64>,
}

impl RowFilter {
    /// Filter scoped to one tenant.
    #[must_use]
    pub fn for_tenant(tenant_id: Uuid) -> Self {
        Self {
            tenant_id: Some(tenant_id),
            ..Self::default()
        }
    }

    /// Adds an equality constraint on a `data` field.
    #[must_use]
    pub fn field(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.equals.insert(name.to_owned(), value.into());
        self
    }

    /// Requires a date or timestamp field to be `>= value`.
    #[must_use]
    pub fn at_least(self, name: &str, value: impl Into<RangeValue>) -> Self {
        self.range(name, RangeOp::AtLeast, value.into())
    }

    /// Requires a date or timestamp field to be `<= value`.
    #[must_use]
    pub fn at_most(self, name: &str, value: impl Into<RangeValue>) -> Self {
        self.range(name, RangeOp::AtMost, value.into())
    }

    fn range(mut self, name: &str, op: RangeOp, value: RangeValue) -> Self {
        self.ranges.push(FieldRange {
            field: name.to_owned(),
            op,
            value,
        });
        self
    }

    /// Sets paging.
    #[must_use]
    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.limit = Some(limit);
        self.offset = Some(offset);
        self
    }

    /// Returns `true` if `row` satisfies the filter (ignores paging).
    #[must_use]
    pub fn matches(&self, row: &ReadModelRow) -> bool {
        if self.tenant_id.is_some_and(|t| t != row.tenant_id) {
            return false;
        }
        self.equals
            .iter()
            .all(|(k, v)| row.data.get(k).is_some_and(|actual| actual == v))
            && self.ranges.iter().all(|r| r.matches(&row.data))
    }
}

/// Storage for read-model rows.
#[async_trait]
pub trait ReadModelStore: Send + Sync {
    /// Fetches one row.
    async fn get(&self, table: ReadModelTable, id: Uuid) -> Result<Option<ReadModelRow>, DomainError>;

    /// Rows matching a filter, oldest first.
    async fn find(
        &self,
        table: ReadModelTable,
        filter: &RowFilter,
    ) -> Result<Vec<ReadModelRow>, DomainError>;

    /// Applies a write set atomically. Writes whose guard fails are skipped
    /// silently.
    async fn apply(&self, writes: &[ReadModelWrite]) -> Result<(), DomainError>;
}

/// Fetches one row of `tenant_id` as a typed view.
///
/// # Errors
///
/// Returns `DomainError::NotFound` if the row is absent or owned by another
/// tenant, and `DomainError::Infrastructure` if it does not decode.
pub async fn get_view<T: DeserializeOwned>(
    store: &dyn ReadModelStore,
    table: ReadModelTable,
    tenant_id: Uuid,
    id: Uuid,
) -> Result<View<T>, DomainError> {
    match store.get(table, id).await? {
        Some(row) if row.tenant_id == tenant_id => View::from_row(&row),
        _ => Err(DomainError::not_found(table.as_str(), id)),
    }
}
