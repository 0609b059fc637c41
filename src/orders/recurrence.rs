use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::orders::OrderError;

/// A date supplied by a caller, either as a full instant or a bare calendar day
///
/// Accepts RFC 3339 timestamps (`2024-01-10T09:30:00Z`) as well as plain
/// `YYYY-MM-DD` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DateInput {
    Instant(DateTime<Utc>),
    Day(NaiveDate),
}

impl DateInput {
    /// Calendar day (UTC) of this date
    pub fn day(&self) -> NaiveDate {
        match self {
            DateInput::Instant(instant) => instant.date_naive(),
            DateInput::Day(day) => *day,
        }
    }

    /// Instant of this date; bare days map to midnight UTC
    pub fn instant(&self) -> DateTime<Utc> {
        match self {
            DateInput::Instant(instant) => *instant,
            DateInput::Day(day) => Utc.from_utc_datetime(&day.and_time(NaiveTime::default())),
        }
    }
}

/// Raw recurrence fields as received from checkout or an edit request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceInput {
    pub start_date: Option<DateInput>,
    pub end_date: Option<DateInput>,
    /// Weekdays, 0 = Sunday through 6 = Saturday
    pub days_of_week: Option<Vec<i32>>,
    pub include_dates: Option<Vec<DateInput>>,
    pub exclude_dates: Option<Vec<DateInput>>,
    pub selected_dates: Option<Vec<DateInput>>,
    pub notes: Option<String>,
}

/// Anything that can signal that an order repeats
pub trait RecurrenceSignal {
    fn has_signal(&self) -> bool;
}

fn non_empty<T>(values: &Option<Vec<T>>) -> bool {
    values.as_ref().map_or(false, |v| !v.is_empty())
}

impl RecurrenceSignal for RecurrenceInput {
    fn has_signal(&self) -> bool {
        self.start_date.is_some()
            || self.end_date.is_some()
            || non_empty(&self.days_of_week)
            || non_empty(&self.include_dates)
            || non_empty(&self.exclude_dates)
            || non_empty(&self.selected_dates)
    }
}

impl RecurrenceSignal for RecurrenceRule {
    fn has_signal(&self) -> bool {
        self.end_date.is_some()
            || !self.days_of_week.is_empty()
            || !self.include_dates.is_empty()
            || !self.exclude_dates.is_empty()
            || !self.selected_dates.is_empty()
    }
}

/// Decide whether an order is recurring
///
/// An order repeats when the explicit flag is set or when any recurrence field
/// carries a value. Used at creation, on edit and when listing.
pub fn has_recurrence_signal<S: RecurrenceSignal>(is_recurring: bool, source: Option<&S>) -> bool {
    is_recurring || source.map_or(false, RecurrenceSignal::has_signal)
}

/// Validated, normalized recurrence rule owned by a single order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub days_of_week: BTreeSet<u8>,
    pub include_dates: Vec<NaiveDate>,
    pub exclude_dates: BTreeSet<NaiveDate>,
    pub selected_dates: Vec<NaiveDate>,
    pub notes: Option<String>,
}

impl RecurrenceRule {
    /// Build a rule from raw input
    ///
    /// `start_date` defaults to `now`. Explicit date lists are reduced to
    /// calendar days, sorted and de-duplicated.
    pub fn from_input(input: &RecurrenceInput, now: DateTime<Utc>) -> Result<Self, OrderError> {
        let start_date = input.start_date.map(|d| d.instant()).unwrap_or(now);
        let end_date = input.end_date.map(|d| d.instant());
        check_bounds(start_date, end_date)?;

        Ok(Self {
            start_date,
            end_date,
            days_of_week: parse_days_of_week(input.days_of_week.as_deref().unwrap_or_default())?,
            include_dates: normalize_days(input.include_dates.as_deref().unwrap_or_default()),
            exclude_dates: input
                .exclude_dates
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(DateInput::day)
                .collect(),
            selected_dates: normalize_days(input.selected_dates.as_deref().unwrap_or_default()),
            notes: input.notes.clone(),
        })
    }

    /// Apply a partial update field by field and re-validate
    pub fn merge(&self, update: &RecurrenceInput) -> Result<Self, OrderError> {
        let start_date = update.start_date.map(|d| d.instant()).unwrap_or(self.start_date);
        let end_date = update.end_date.map(|d| d.instant()).or(self.end_date);
        check_bounds(start_date, end_date)?;

        let days_of_week = match update.days_of_week.as_deref() {
            Some(raw) => parse_days_of_week(raw)?,
            None => self.days_of_week.clone(),
        };

        Ok(Self {
            start_date,
            end_date,
            days_of_week,
            include_dates: update
                .include_dates
                .as_deref()
                .map(normalize_days)
                .unwrap_or_else(|| self.include_dates.clone()),
            exclude_dates: update
                .exclude_dates
                .as_deref()
                .map(|dates| dates.iter().map(DateInput::day).collect())
                .unwrap_or_else(|| self.exclude_dates.clone()),
            selected_dates: update
                .selected_dates
                .as_deref()
                .map(normalize_days)
                .unwrap_or_else(|| self.selected_dates.clone()),
            notes: update.notes.clone().or_else(|| self.notes.clone()),
        })
    }

    pub fn is_excluded(&self, day: NaiveDate) -> bool {
        self.exclude_dates.contains(&day)
    }

    pub fn matches_weekday(&self, day: NaiveDate) -> bool {
        self.days_of_week
            .contains(&(day.weekday().num_days_from_sunday() as u8))
    }

    /// True when `day` is on or before the end date (or there is none)
    pub fn within_end_date(&self, day: NaiveDate) -> bool {
        self.end_date.map_or(true, |end| day <= end.date_naive())
    }
}

fn check_bounds(start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Result<(), OrderError> {
    match end {
        Some(end) if end < start => Err(OrderError::ValidationError(format!(
            "Recurrence end date {} is before start date {}",
            end.to_rfc3339(),
            start.to_rfc3339()
        ))),
        _ => Ok(()),
    }
}

fn parse_days_of_week(raw: &[i32]) -> Result<BTreeSet<u8>, OrderError> {
    raw.iter()
        .map(|&day| {
            if (0..=6).contains(&day) {
                Ok(day as u8)
            } else {
                Err(OrderError::ValidationError(format!(
                    "Invalid day of week {}: must be between 0 (Sunday) and 6 (Saturday)",
                    day
                )))
            }
        })
        .collect()
}

fn normalize_days(dates: &[DateInput]) -> Vec<NaiveDate> {
    let days: BTreeSet<NaiveDate> = dates.iter().map(DateInput::day).collect();
    days.into_iter().collect()
}
