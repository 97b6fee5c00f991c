//! Pure slot planning.
//!
//! Decides, for each calendar date, which schedule source governs a doctor's
//! day and slices the governing windows into bookable slots. Nothing here
//! touches storage; the generation engine gathers the inputs from read models
//! and turns the planned slots into a `generate_slots` command.

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike, Weekday};
use clinicops_core::error::{DomainError, ValidationErrors};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Shortest allowed slot.
pub const MIN_SLOT_MINUTES: u32 = 5;
/// Longest allowed slot.
pub const MAX_SLOT_MINUTES: u32 = 480;
/// Longest allowed gap between slots.
pub const MAX_BUFFER_MINUTES: u32 = 120;
/// Capacity bounds for one slot.
pub const MAX_SLOT_CAPACITY: u32 = 50;
/// Longest date range one generation run may cover.
pub const MAX_GENERATION_DAYS: i64 = 366;

/// Inputs that can shape a doctor's day, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleSource {
    /// Administrative block at hospital or doctor level.
    ForcedBlock,
    /// Emergency unavailability.
    EmergencyUnavailability,
    /// Approved leave.
    LeaveRequest,
    /// Hospital holiday.
    Holiday,
    /// Per-date override.
    Override,
    /// Recurring weekly schedule.
    BaseSchedule,
}

impl ScheduleSource {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ForcedBlock => "forced_block",
            Self::EmergencyUnavailability => "emergency_unavailability",
            Self::LeaveRequest => "leave_request",
            Self::Holiday => "holiday",
            Self::Override => "override",
            Self::BaseSchedule => "base_schedule",
        }
    }
}

/// How a consultation takes place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationMode {
    /// On site.
    InPerson,
    /// Remote.
    Virtual,
    /// Either; only valid on a slot, never on a booking.
    Hybrid,
}

impl ConsultationMode {
    /// Returns `true` if a slot offered in `self` can host a booking made in
    /// `requested`.
    #[must_use]
    pub fn accepts(self, requested: Self) -> bool {
        match (self, requested) {
            (_, Self::Hybrid) => false,
            (Self::Hybrid, _) => true,
            (offered, requested) => offered == requested,
        }
    }

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InPerson => "in_person",
            Self::Virtual => "virtual",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Day of the week a recurring schedule repeats on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayOfWeek {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl From<Weekday> for DayOfWeek {
    fn from(day: Weekday) -> Self {
        match day {
            Weekday::Mon => Self::Monday,
            Weekday::Tue => Self::Tuesday,
            Weekday::Wed => Self::Wednesday,
            Weekday::Thu => Self::Thursday,
            Weekday::Fri => Self::Friday,
            Weekday::Sat => Self::Saturday,
            Weekday::Sun => Self::Sunday,
        }
    }
}

/// Purpose of a tentative hold; decides its default lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldType {
    /// A patient is completing a booking.
    PatientBooking,
    /// Staff are booking on a patient's behalf.
    AdminBooking,
    /// Held by an automated process.
    SystemReservation,
}

impl HoldType {
    /// Lifetime used when the caller supplies none.
    #[must_use]
    pub fn default_ttl_minutes(self) -> u32 {
        match self {
            Self::PatientBooking => 10,
            Self::AdminBooking | Self::SystemReservation => 30,
        }
    }

    /// Resolves the hold lifetime, validating a caller-supplied value.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `requested` is outside 1 to 120
    /// minutes.
    pub fn ttl_minutes(self, requested: Option<u32>) -> Result<u32, DomainError> {
        match requested {
            None => Ok(self.default_ttl_minutes()),
            Some(ttl) if (1..=120).contains(&ttl) => Ok(ttl),
            Some(_) => Err(DomainError::invalid(
                "ttl_minutes",
                "must be between 1 and 120",
            )),
        }
    }
}

/// A daily working window and how to slice it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotWindow {
    /// First slot start.
    pub start_time: NaiveTime,
    /// No slot ends after this.
    pub end_time: NaiveTime,
    /// Slot length.
    pub slot_duration_minutes: u32,
    /// Gap after each slot.
    #[serde(default)]
    pub buffer_minutes: u32,
    /// Mode offered by the slots.
    pub consultation_mode: ConsultationMode,
    /// Bookings per slot.
    pub max_capacity: u32,
    /// Where the consultations happen.
    #[serde(default)]
    pub location_id: Option<Uuid>,
}

impl SlotWindow {
    /// Records every rule the window breaks.
    pub fn check(&self, errors: &mut ValidationErrors) {
        errors.check(self.end_time > self.start_time, "end_time", "must be after start_time");
        errors.check(
            (MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&self.slot_duration_minutes),
            "slot_duration_minutes",
            "must be between 5 and 480",
        );
        errors.check(
            self.buffer_minutes <= MAX_BUFFER_MINUTES,
            "buffer_minutes",
            "must be between 0 and 120",
        );
        errors.check(
            (1..=MAX_SLOT_CAPACITY).contains(&self.max_capacity),
            "max_capacity",
            "must be between 1 and 50",
        );
        if self.end_time > self.start_time {
            errors.check(
                minutes_of(self.end_time) - minutes_of(self.start_time) >= self.slot_duration_minutes,
                "end_time",
                "window must fit at least one slot",
            );
        }
    }

    /// Validates the window on its own.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` listing every broken rule.
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut errors = ValidationErrors::new();
        self.check(&mut errors);
        errors.into_result()
    }

    /// Start and end times of every whole slot in the window.
    ///
    /// Slots advance by duration plus buffer; a trailing partial slot is
    /// dropped.
    #[must_use]
    pub fn slice(&self) -> Vec<(NaiveTime, NaiveTime)> {
        let duration = self.slot_duration_minutes;
        if duration == 0 {
            return Vec::new();
        }
        let end = minutes_of(self.end_time);
        let step = duration + self.buffer_minutes;
        let mut slots = Vec::new();
        let mut start = minutes_of(self.start_time);
        while start + duration <= end {
            if let (Some(from), Some(to)) = (time_of(start), time_of(start + duration)) {
                slots.push((from, to));
            }
            start += step;
        }
        slots
    }
}

fn minutes_of(time: NaiveTime) -> u32 {
    time.num_seconds_from_midnight() / 60
}

fn time_of(minutes: u32) -> Option<NaiveTime> {
    NaiveTime::from_num_seconds_from_midnight_opt(minutes * 60, 0)
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateSpan {
    /// First day.
    pub start_date: NaiveDate,
    /// Last day.
    pub end_date: NaiveDate,
}

impl DateSpan {
    /// Returns `true` if `date` falls inside the span.
    #[must_use]
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    /// Number of days in the span.
    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end_date - self.start_date).num_days() + 1
    }

    /// Checks that the span is ordered.
    pub fn check(&self, errors: &mut ValidationErrors) {
        errors.check(
            self.end_date >= self.start_date,
            "end_date",
            "must not be before start_date",
        );
    }

    /// Every date in the span.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let end = self.end_date;
        self.start_date.iter_days().take_while(move |d| *d <= end)
    }
}

/// An active recurring schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct BaseSchedule {
    /// Weekday it repeats on.
    pub day_of_week: DayOfWeek,
    /// The daily window.
    pub window: SlotWindow,
    /// First day it applies.
    pub effective_from: NaiveDate,
    /// Last day it applies, if bounded.
    pub effective_until: Option<NaiveDate>,
}

impl BaseSchedule {
    fn applies_on(&self, date: NaiveDate) -> bool {
        DayOfWeek::from(date.weekday()) == self.day_of_week
            && self.effective_from <= date
            && self.effective_until.is_none_or(|until| date <= until)
    }
}

/// An active per-date override. `None` means the doctor is unavailable.
#[derive(Debug, Clone, PartialEq)]
pub struct DateOverride {
    /// The date overridden.
    pub date: NaiveDate,
    /// Replacement window.
    pub window: Option<SlotWindow>,
}

/// Active availability inputs for one doctor. Callers pass only records in
/// force: approved leave, active holidays, unresolved emergencies, unlifted
/// blocks, active overrides and schedules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScheduleInputs {
    /// Forced blocks at doctor or hospital level.
    pub forced_blocks: Vec<DateSpan>,
    /// Emergency unavailability.
    pub emergencies: Vec<DateSpan>,
    /// Approved leave.
    pub leaves: Vec<DateSpan>,
    /// Hospital holidays.
    pub holidays: Vec<NaiveDate>,
    /// Per-date overrides.
    pub overrides: Vec<DateOverride>,
    /// Recurring schedules.
    pub base_schedules: Vec<BaseSchedule>,
}

/// What governs one day.
#[derive(Debug, Clone, PartialEq)]
pub enum DayPlan {
    /// A blocking source wins; no slots.
    Blocked(ScheduleSource),
    /// Slots come from these windows.
    Open {
        /// Override or base schedule.
        source: ScheduleSource,
        /// Windows to slice.
        windows: Vec<SlotWindow>,
    },
    /// Nothing is scheduled.
    Closed,
}

/// Picks the schedule source in force on `date`.
#[must_use]
pub fn resolve_day(date: NaiveDate, inputs: &ScheduleInputs) -> DayPlan {
    let covered = |spans: &[DateSpan]| spans.iter().any(|s| s.covers(date));
    if covered(&inputs.forced_blocks) {
        return DayPlan::Blocked(ScheduleSource::ForcedBlock);
    }
    if covered(&inputs.emergencies) {
        return DayPlan::Blocked(ScheduleSource::EmergencyUnavailability);
    }
    if covered(&inputs.leaves) {
        return DayPlan::Blocked(ScheduleSource::LeaveRequest);
    }
    if inputs.holidays.contains(&date) {
        return DayPlan::Blocked(ScheduleSource::Holiday);
    }
    if let Some(found) = inputs.overrides.iter().find(|o| o.date == date) {
        return match &found.window {
            Some(window) => DayPlan::Open {
                source: ScheduleSource::Override,
                windows: vec![window.clone()],
            },
            None => DayPlan::Blocked(ScheduleSource::Override),
        };
    }
    let windows: Vec<SlotWindow> = inputs
        .base_schedules
        .iter()
        .filter(|s| s.applies_on(date))
        .map(|s| s.window.clone())
        .collect();
    if windows.is_empty() {
        DayPlan::Closed
    } else {
        DayPlan::Open {
            source: ScheduleSource::BaseSchedule,
            windows,
        }
    }
}

/// A slot the planner would create.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedSlot {
    /// Calendar date.
    pub date: NaiveDate,
    /// Start time.
    pub start_time: NaiveTime,
    /// End time.
    pub end_time: NaiveTime,
    /// Length in minutes.
    pub duration_minutes: u32,
    /// Mode offered.
    pub consultation_mode: ConsultationMode,
    /// Bookings allowed.
    pub max_capacity: u32,
    /// Where.
    pub location_id: Option<Uuid>,
    /// Override or base schedule.
    pub schedule_source: ScheduleSource,
}

/// Plans every slot in `span`, in date then start-time order.
#[must_use]
pub fn plan_slots(span: DateSpan, inputs: &ScheduleInputs) -> Vec<PlannedSlot> {
    let mut planned = Vec::new();
    for date in span.dates() {
        let DayPlan::Open { source, windows } = resolve_day(date, inputs) else {
            continue;
        };
        let mut day: Vec<PlannedSlot> = windows
            .iter()
            .flat_map(|window| {
                window.slice().into_iter().map(move |(start_time, end_time)| PlannedSlot {
                    date,
                    start_time,
                    end_time,
                    duration_minutes: window.slot_duration_minutes,
                    consultation_mode: window.consultation_mode,
                    max_capacity: window.max_capacity,
                    location_id: window.location_id,
                    schedule_source: source,
                })
            })
            .collect();
        day.sort_by_key(|s| s.start_time);
        day.dedup_by_key(|s| s.start_time);
        planned.extend(day);
    }
    planned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn date(d: u32) -> NaiveDate {
        // 2026-02-02 is a Monday.
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    fn window(start: NaiveTime, end: NaiveTime, duration: u32, buffer: u32) -> SlotWindow {
        SlotWindow {
            start_time: start,
            end_time: end,
            slot_duration_minutes: duration,
            buffer_minutes: buffer,
            consultation_mode: ConsultationMode::InPerson,
            max_capacity: 1,
            location_id: None,
        }
    }

    fn monday_schedule() -> BaseSchedule {
        BaseSchedule {
            day_of_week: DayOfWeek::Monday,
            window: window(time(9, 0), time(17, 0), 30, 0),
            effective_from: date(1),
            effective_until: None,
        }
    }

    fn one_day(d: u32) -> DateSpan {
        DateSpan {
            start_date: date(d),
            end_date: date(d),
        }
    }

    #[test]
    fn test_working_day_slices_into_sixteen_half_hour_slots() {
        // Arrange
        let inputs = ScheduleInputs {
            base_schedules: vec![monday_schedule()],
            ..ScheduleInputs::default()
        };

        // Act
        let slots = plan_slots(one_day(2), &inputs);

        // Assert
        assert_eq!(slots.len(), 16);
        assert_eq!((slots[0].start_time, slots[0].end_time), (time(9, 0), time(9, 30)));
        assert_eq!((slots[15].start_time, slots[15].end_time), (time(16, 30), time(17, 0)));
        assert!(slots.iter().all(|s| s.schedule_source == ScheduleSource::BaseSchedule));
    }

    #[test]
    fn test_buffer_advances_slots_and_drops_partial_tail() {
        let slots = window(time(9, 0), time(10, 0), 20, 10).slice();

        assert_eq!(slots, vec![(time(9, 0), time(9, 20)), (time(9, 30), time(9, 50))]);
    }

    #[test]
    fn test_forced_block_beats_leave_and_base_schedule() {
        let span = one_day(2);
        let inputs = ScheduleInputs {
            forced_blocks: vec![span],
            leaves: vec![span],
            base_schedules: vec![monday_schedule()],
            ..ScheduleInputs::default()
        };

        assert_eq!(resolve_day(date(2), &inputs), DayPlan::Blocked(ScheduleSource::ForcedBlock));
        assert!(plan_slots(span, &inputs).is_empty());
    }

    #[test]
    fn test_leave_blocks_base_schedule() {
        let span = one_day(2);
        let inputs = ScheduleInputs {
            leaves: vec![span],
            base_schedules: vec![monday_schedule()],
            ..ScheduleInputs::default()
        };

        assert!(plan_slots(span, &inputs).is_empty());
    }

    #[test]
    fn test_override_replaces_base_schedule_then_base_applies_elsewhere() {
        // Arrange
        let inputs = ScheduleInputs {
            overrides: vec![DateOverride {
                date: date(2),
                window: Some(window(time(13, 0), time(14, 0), 30, 0)),
            }],
            base_schedules: vec![monday_schedule()],
            ..ScheduleInputs::default()
        };

        // Act
        let overridden = plan_slots(one_day(2), &inputs);
        let regular = plan_slots(one_day(9), &inputs);

        // Assert
        assert_eq!(overridden.len(), 2);
        assert_eq!(overridden[0].schedule_source, ScheduleSource::Override);
        assert_eq!(regular.len(), 16);
    }

    #[test]
    fn test_unavailable_override_blocks_the_day() {
        let inputs = ScheduleInputs {
            overrides: vec![DateOverride {
                date: date(2),
                window: None,
            }],
            base_schedules: vec![monday_schedule()],
            ..ScheduleInputs::default()
        };

        assert_eq!(resolve_day(date(2), &inputs), DayPlan::Blocked(ScheduleSource::Override));
    }

    #[test]
    fn test_base_schedule_respects_weekday_and_effective_dates() {
        let mut schedule = monday_schedule();
        schedule.effective_until = Some(date(5));
        let inputs = ScheduleInputs {
            base_schedules: vec![schedule],
            ..ScheduleInputs::default()
        };

        assert!(matches!(resolve_day(date(2), &inputs), DayPlan::Open { .. }));
        assert_eq!(resolve_day(date(3), &inputs), DayPlan::Closed);
        assert_eq!(resolve_day(date(9), &inputs), DayPlan::Closed);
    }

    #[test]
    fn test_window_validation_collects_every_violation() {
        let bad = SlotWindow {
            max_capacity: 0,
            ..window(time(10, 0), time(9, 0), 2, 121)
        };

        match bad.validate() {
            Err(DomainError::Validation(errors)) => {
                let fields: Vec<&str> = errors.errors().iter().map(|e| e.field.as_str()).collect();
                assert_eq!(
                    fields,
                    vec!["end_time", "slot_duration_minutes", "buffer_minutes", "max_capacity"]
                );
            }
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_window_shorter_than_one_slot_is_rejected() {
        assert!(window(time(9, 0), time(9, 20), 30, 0).validate().is_err());
    }

    #[test]
    fn test_hybrid_slot_accepts_both_modes() {
        assert!(ConsultationMode::Hybrid.accepts(ConsultationMode::InPerson));
        assert!(ConsultationMode::Hybrid.accepts(ConsultationMode::Virtual));
        assert!(!ConsultationMode::InPerson.accepts(ConsultationMode::Virtual));
        assert!(!ConsultationMode::Hybrid.accepts(ConsultationMode::Hybrid));
    }

    #[test]
    fn test_hold_ttl_defaults_and_bounds() {
        assert_eq!(HoldType::PatientBooking.ttl_minutes(None).unwrap(), 10);
        assert_eq!(HoldType::AdminBooking.ttl_minutes(None).unwrap(), 30);
        assert_eq!(HoldType::SystemReservation.ttl_minutes(Some(120)).unwrap(), 120);
        assert!(HoldType::PatientBooking.ttl_minutes(Some(0)).is_err());
        assert!(HoldType::PatientBooking.ttl_minutes(Some(121)).is_err());
    }
}
