use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::orders::RecurrenceRule;

/// Number of consecutive days scanned when falling back to the weekday pattern
pub const WEEKDAY_SCAN_DAYS: i64 = 28;

/// Computes the next eligible delivery date for a recurrence rule
///
/// Pure: the result depends only on the rule and the supplied `now`.
pub struct DeliveryDateResolver;

impl DeliveryDateResolver {
    /// Earliest eligible delivery day on or after `max(now, rule.start_date)`
    ///
    /// Resolution order:
    /// 1. explicit dates (`selected_dates`, then `include_dates`) that are on or
    ///    after the lower bound and not excluded; the earliest wins
    /// 2. otherwise the first day within the next 28 days (starting at the lower
    ///    bound) whose weekday is in `days_of_week` and is not excluded
    /// 3. otherwise `None`
    pub fn next_delivery_date(rule: &RecurrenceRule, now: DateTime<Utc>) -> Option<NaiveDate> {
        let lower_bound = now.max(rule.start_date).date_naive();

        Self::earliest_explicit_date(rule, lower_bound)
            .or_else(|| Self::scan_weekdays(rule, lower_bound))
    }

    fn earliest_explicit_date(rule: &RecurrenceRule, lower_bound: NaiveDate) -> Option<NaiveDate> {
        rule.selected_dates
            .iter()
            .chain(rule.include_dates.iter())
            .copied()
            .filter(|day| *day >= lower_bound && !rule.is_excluded(*day))
            .min()
    }

    fn scan_weekdays(rule: &RecurrenceRule, lower_bound: NaiveDate) -> Option<NaiveDate> {
        if rule.days_of_week.is_empty() {
            return None;
        }

        // Scanning stops at the end of the calendar
        (0..WEEKDAY_SCAN_DAYS)
            .map_while(|offset| lower_bound.checked_add_signed(Duration::days(offset)))
            .find(|day| rule.matches_weekday(*day) && !rule.is_excluded(*day))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::{DateInput, RecurrenceInput};
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn midnight(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    fn rule(input: RecurrenceInput) -> RecurrenceRule {
        RecurrenceRule::from_input(&input, midnight(2024, 1, 1)).unwrap()
    }

    fn days(list: &[NaiveDate]) -> Option<Vec<DateInput>> {
        Some(list.iter().copied().map(DateInput::Day).collect())
    }

    #[test]
    fn test_weekday_pattern_matches_start_day() {
        // 2024-01-01 is a Monday
        let rule = rule(RecurrenceInput {
            start_date: Some(DateInput::Day(day(2024, 1, 1))),
            days_of_week: Some(vec![1, 3, 5]),
            ..Default::default()
        });

        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 1)),
            Some(day(2024, 1, 1))
        );
        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 2)),
            Some(day(2024, 1, 3))
        );
        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 10)),
            Some(day(2024, 1, 10))
        );
    }

    #[test]
    fn test_start_date_in_future_is_lower_bound() {
        let rule = rule(RecurrenceInput {
            start_date: Some(DateInput::Day(day(2024, 2, 1))),
            days_of_week: Some(vec![1]),
            ..Default::default()
        });

        // 2024-02-05 is the first Monday on or after Feb 1st
        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 1)),
            Some(day(2024, 2, 5))
        );
    }

    #[test]
    fn test_explicit_dates_take_priority_over_weekdays() {
        // Weekday pattern would give 2024-01-02 (Tuesday)
        let rule = rule(RecurrenceInput {
            days_of_week: Some(vec![2]),
            selected_dates: days(&[day(2024, 1, 20)]),
            include_dates: days(&[day(2024, 1, 15)]),
            ..Default::default()
        });

        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 1)),
            Some(day(2024, 1, 15))
        );
    }

    #[test]
    fn test_past_explicit_dates_fall_back_to_weekdays() {
        let rule = rule(RecurrenceInput {
            days_of_week: Some(vec![4]),
            include_dates: days(&[day(2024, 1, 2)]),
            ..Default::default()
        });

        // Jan 2nd is already behind us; next Thursday is Jan 11th
        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 8)),
            Some(day(2024, 1, 11))
        );
    }

    #[test]
    fn test_excluded_dates_are_skipped() {
        let rule = rule(RecurrenceInput {
            include_dates: days(&[day(2024, 1, 5), day(2024, 1, 6)]),
            exclude_dates: days(&[day(2024, 1, 5)]),
            ..Default::default()
        });

        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 1)),
            Some(day(2024, 1, 6))
        );
    }

    #[test]
    fn test_excluded_weekday_moves_to_following_week() {
        let rule = rule(RecurrenceInput {
            days_of_week: Some(vec![1]),
            exclude_dates: days(&[day(2024, 1, 1)]),
            ..Default::default()
        });

        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 1)),
            Some(day(2024, 1, 8))
        );
    }

    #[test]
    fn test_weekday_scan_is_bounded_to_28_days() {
        // Exclude every Tuesday inside the 28-day window starting Jan 1st
        let rule = rule(RecurrenceInput {
            days_of_week: Some(vec![2]),
            exclude_dates: days(&[
                day(2024, 1, 2),
                day(2024, 1, 9),
                day(2024, 1, 16),
                day(2024, 1, 23),
            ]),
            ..Default::default()
        });

        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 1)),
            None
        );
        // One day later the window reaches Tuesday Jan 30th
        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 3)),
            Some(day(2024, 1, 30))
        );
    }

    #[test]
    fn test_rule_without_sources_never_resolves() {
        let rule = rule(RecurrenceInput {
            notes: Some("call first".to_string()),
            ..Default::default()
        });
        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 1)),
            None
        );
    }

    #[test]
    fn test_time_of_day_is_ignored() {
        let rule = rule(RecurrenceInput {
            include_dates: days(&[day(2024, 1, 1)]),
            ..Default::default()
        });
        let late_evening = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 0).unwrap();

        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, late_evening),
            Some(day(2024, 1, 1))
        );
    }

    #[test]
    fn test_scan_stops_at_last_calendar_day() {
        let rule = rule(RecurrenceInput {
            start_date: Some(DateInput::Day(NaiveDate::MAX)),
            days_of_week: Some((0..=6).collect()),
            exclude_dates: days(&[NaiveDate::MAX]),
            ..Default::default()
        });

        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&rule, midnight(2024, 1, 1)),
            None
        );

        let open_ended = RecurrenceRule {
            exclude_dates: Default::default(),
            ..rule
        };
        assert_eq!(
            DeliveryDateResolver::next_delivery_date(&open_ended, midnight(2024, 1, 1)),
            Some(NaiveDate::MAX)
        );
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::orders::{DateInput, RecurrenceInput};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn base_day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
    }

    fn offset_day(offset: i64) -> NaiveDate {
        base_day() + Duration::days(offset)
    }

    fn rule_strategy() -> impl Strategy<Value = RecurrenceRule> {
        (
            prop::collection::vec(0i32..=6, 0..4),
            prop::collection::vec(0i64..60, 0..4),
            prop::collection::vec(0i64..60, 0..4),
            prop::collection::vec(0i64..60, 0..6),
        )
            .prop_map(|(weekdays, include, selected, exclude)| {
                let to_dates = |offsets: Vec<i64>| {
                    Some(offsets.into_iter().map(|o| DateInput::Day(offset_day(o))).collect())
                };
                let input = RecurrenceInput {
                    start_date: Some(DateInput::Day(base_day())),
                    days_of_week: Some(weekdays),
                    include_dates: to_dates(include),
                    selected_dates: to_dates(selected),
                    exclude_dates: to_dates(exclude),
                    ..Default::default()
                };
                RecurrenceRule::from_input(&input, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
                    .unwrap()
            })
    }

    fn now_strategy() -> impl Strategy<Value = DateTime<Utc>> {
        (0i64..45, 0u32..24).prop_map(|(offset, hour)| {
            Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap() + Duration::days(offset)
        })
    }

    proptest! {
        /// Same inputs always give the same answer
        #[test]
        fn prop_resolution_is_deterministic(rule in rule_strategy(), now in now_strategy()) {
            let first = DeliveryDateResolver::next_delivery_date(&rule, now);
            let second = DeliveryDateResolver::next_delivery_date(&rule, now);
            prop_assert_eq!(first, second);
        }

        /// A resolved day is never excluded and never before the lower bound
        #[test]
        fn prop_resolved_day_is_eligible(rule in rule_strategy(), now in now_strategy()) {
            if let Some(resolved) = DeliveryDateResolver::next_delivery_date(&rule, now) {
                prop_assert!(!rule.is_excluded(resolved));
                prop_assert!(resolved >= now.max(rule.start_date).date_naive());
            }
        }

        /// Any eligible explicit date beats the weekday pattern
        #[test]
        fn prop_explicit_pool_wins(rule in rule_strategy(), now in now_strategy()) {
            let lower = now.max(rule.start_date).date_naive();
            let eligible_explicit = rule
                .selected_dates
                .iter()
                .chain(rule.include_dates.iter())
                .copied()
                .filter(|d| *d >= lower && !rule.is_excluded(*d))
                .min();

            if let Some(expected) = eligible_explicit {
                prop_assert_eq!(DeliveryDateResolver::next_delivery_date(&rule, now), Some(expected));
            }
        }

        /// Weekday fallback stays within the 28-day horizon
        #[test]
        fn prop_weekday_fallback_within_horizon(rule in rule_strategy(), now in now_strategy()) {
            let lower = now.max(rule.start_date).date_naive();
            let has_explicit = rule
                .selected_dates
                .iter()
                .chain(rule.include_dates.iter())
                .any(|d| *d >= lower && !rule.is_excluded(*d));

            if !has_explicit {
                if let Some(resolved) = DeliveryDateResolver::next_delivery_date(&rule, now) {
                    prop_assert!(rule.matches_weekday(resolved));
                    prop_assert!((resolved - lower).num_days() < WEEKDAY_SCAN_DAYS);
                }
            }
        }
    }
}
