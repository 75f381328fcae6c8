//! Calendar arithmetic for maintenance cycles.
//!
//! Date-only values are pinned to local noon before any month arithmetic and
//! reduced back to a date afterwards, so a UTC offset can never push a due
//! date across a day boundary. Timestamps written to storage are derived the
//! same way: noon at the configured offset, never midnight.

use chrono::{
    DateTime, Duration, FixedOffset, Months, NaiveDate, NaiveTime, Offset, Utc,
};

use crate::error::{DeskError, Result};
use crate::models::{Frequency, Urgency, UrgencyStatus};

pub const URGENT_WITHIN_DAYS: i64 = 7;
pub const UPCOMING_WITHIN_DAYS: i64 = 30;

fn noon() -> NaiveTime {
    NaiveTime::MIN + Duration::hours(12)
}

pub fn utc_offset() -> FixedOffset {
    Utc.fix()
}

pub fn anchor_at_noon(date: NaiveDate, offset: FixedOffset) -> DateTime<FixedOffset> {
    let local = date.and_time(noon());
    let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc, offset)
}

/// The due date one `frequency` period after `base`, anchored at `offset`.
/// Month-end overflow clamps to the last day of the target month
/// (Jan 31 + 1 month is Feb 28, or Feb 29 in leap years).
pub fn advance_at(base: NaiveDate, frequency: Frequency, offset: FixedOffset) -> Result<NaiveDate> {
    anchor_at_noon(base, offset)
        .checked_add_months(Months::new(frequency.months()))
        .map(|moved| moved.date_naive())
        .ok_or_else(|| {
            DeskError::validation(format!(
                "{base} plus one {} period is outside the supported calendar",
                frequency.as_str()
            ))
        })
}

/// Whole days from `today` until `next`, negative once `next` has passed.
pub fn days_until(next: NaiveDate, today: NaiveDate) -> i64 {
    let offset = utc_offset();
    (anchor_at_noon(next, offset) - anchor_at_noon(today, offset)).num_days()
}

pub fn urgency_for_days(days: i64) -> UrgencyStatus {
    match days {
        d if d < 0 => UrgencyStatus::Overdue,
        0..=URGENT_WITHIN_DAYS => UrgencyStatus::Urgent,
        d if d <= UPCOMING_WITHIN_DAYS => UrgencyStatus::Upcoming,
        _ => UrgencyStatus::Future,
    }
}

pub fn classify(next: NaiveDate, today: NaiveDate) -> Urgency {
    let days = days_until(next, today);
    Urgency {
        status: urgency_for_days(days),
        days_until: days,
    }
}

pub fn today_at(offset: FixedOffset) -> NaiveDate {
    Utc::now().with_timezone(&offset).date_naive()
}

pub const MAX_WINDOW_DAYS: i64 = 36_500;

/// First day of a look-back window of `days` days ending at `today`.
pub fn window_start(today: NaiveDate, days: i64) -> Result<NaiveDate> {
    if !(1..=MAX_WINDOW_DAYS).contains(&days) {
        return Err(DeskError::validation(format!(
            "window must be between 1 and {MAX_WINDOW_DAYS} days, got {days}"
        )));
    }
    Duration::try_days(days)
        .and_then(|span| today.checked_sub_signed(span))
        .ok_or_else(|| DeskError::validation(format!("{days} days before {today} is out of range")))
}

pub fn to_storage_timestamp(date: NaiveDate, offset: FixedOffset) -> DateTime<Utc> {
    anchor_at_noon(date, offset).with_timezone(&Utc)
}

/// Accepts `YYYY-MM-DD` or an RFC 3339 timestamp.
///
/// A timestamp sitting exactly on midnight of its own offset is a date-only
/// value that went through a date-time field; its own calendar date is kept.
/// Any other timestamp is reduced to its date at `offset`.
pub fn parse_calendar_date(input: &str, offset: FixedOffset) -> Result<NaiveDate> {
    let value = input.trim();
    if value.is_empty() {
        return Err(DeskError::validation("date is required"));
    }

    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }

    let stamp = DateTime::parse_from_rfc3339(value)
        .map_err(|_| DeskError::validation(format!("`{value}` is not a calendar date")))?;
    if stamp.time() == NaiveTime::MIN {
        Ok(stamp.date_naive())
    } else {
        Ok(stamp.with_timezone(&offset).date_naive())
    }
}

pub fn parse_offset(raw: &str) -> Result<FixedOffset> {
    let value = raw.trim();
    if value.eq_ignore_ascii_case("z") || value.eq_ignore_ascii_case("utc") {
        return Ok(utc_offset());
    }
    value
        .parse::<FixedOffset>()
        .map_err(|_| DeskError::validation(format!("invalid UTC offset `{value}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn west(hours: i32) -> FixedOffset {
        FixedOffset::west_opt(hours * 3600).unwrap()
    }

    fn east(hours: i32) -> FixedOffset {
        FixedOffset::east_opt(hours * 3600).unwrap()
    }

    fn advance(base: NaiveDate, frequency: Frequency) -> Result<NaiveDate> {
        advance_at(base, frequency, utc_offset())
    }

    #[test]
    fn window_start_counts_back() {
        assert_eq!(window_start(date(2025, 3, 31), 30).unwrap(), date(2025, 3, 1));
        assert_eq!(window_start(date(2025, 3, 1), 1).unwrap(), date(2025, 2, 28));
    }

    #[test]
    fn window_start_rejects_out_of_range_spans() {
        let today = date(2025, 3, 1);
        for days in [0, -5, MAX_WINDOW_DAYS + 1, 9_999_999_999_999, i64::MAX] {
            assert!(
                matches!(window_start(today, days), Err(DeskError::Validation(_))),
                "{days} days"
            );
        }
    }

    #[test]
    fn each_frequency_adds_its_months() {
        let base = date(2025, 3, 10);
        assert_eq!(advance(base, Frequency::Monthly).unwrap(), date(2025, 4, 10));
        assert_eq!(advance(base, Frequency::Bimonthly).unwrap(), date(2025, 5, 10));
        assert_eq!(advance(base, Frequency::Quarterly).unwrap(), date(2025, 6, 10));
        assert_eq!(advance(base, Frequency::Semiannual).unwrap(), date(2025, 9, 10));
        assert_eq!(advance(base, Frequency::Annual).unwrap(), date(2026, 3, 10));
    }

    #[test]
    fn january_31_lands_in_february_at_any_offset() {
        for offset in [west(12), utc_offset(), east(14)] {
            let next = advance_at(date(2025, 1, 31), Frequency::Monthly, offset).unwrap();
            assert_eq!(next, date(2025, 2, 28), "offset {offset}");
        }
        assert_eq!(
            advance(date(2024, 1, 31), Frequency::Monthly).unwrap(),
            date(2024, 2, 29)
        );
    }

    #[test]
    fn march_31_clamps_to_april_30() {
        assert_eq!(
            advance(date(2025, 3, 31), Frequency::Monthly).unwrap(),
            date(2025, 4, 30)
        );
        assert_eq!(
            advance(date(2025, 3, 31), Frequency::Semiannual).unwrap(),
            date(2025, 9, 30)
        );
    }

    #[test]
    fn storage_timestamps_are_noon_and_round_trip() {
        let day = date(2025, 1, 31);
        for offset in [west(12), west(3), utc_offset(), east(9), east(14)] {
            let stamp = to_storage_timestamp(day, offset);
            assert_eq!(stamp.with_timezone(&offset).time(), noon());
            assert_eq!(stamp.with_timezone(&offset).date_naive(), day, "offset {offset}");
        }
    }

    #[test]
    fn urgency_boundaries() {
        let today = date(2025, 3, 1);
        let cases = [
            (-1, UrgencyStatus::Overdue),
            (0, UrgencyStatus::Urgent),
            (7, UrgencyStatus::Urgent),
            (8, UrgencyStatus::Upcoming),
            (30, UrgencyStatus::Upcoming),
            (31, UrgencyStatus::Future),
        ];
        for (days, expected) in cases {
            let urgency = classify(today + Duration::days(days), today);
            assert_eq!(urgency.status, expected, "{days} days");
            assert_eq!(urgency.days_until, days);
        }
    }

    #[test]
    fn day_counts_cross_month_and_year_ends() {
        assert_eq!(days_until(date(2025, 3, 1), date(2025, 2, 28)), 1);
        assert_eq!(days_until(date(2026, 1, 1), date(2025, 12, 31)), 1);
        assert_eq!(days_until(date(2025, 1, 1), date(2025, 1, 11)), -10);
    }

    #[test]
    fn parses_plain_dates_and_timestamps() {
        let offset = west(3);
        assert_eq!(parse_calendar_date("2025-06-01", offset).unwrap(), date(2025, 6, 1));
        assert_eq!(
            parse_calendar_date("2025-06-01T00:00:00Z", offset).unwrap(),
            date(2025, 6, 1)
        );
        assert_eq!(
            parse_calendar_date("2025-06-01T15:00:00Z", offset).unwrap(),
            date(2025, 6, 1)
        );
        assert_eq!(
            parse_calendar_date("2025-06-01T02:00:00Z", offset).unwrap(),
            date(2025, 5, 31)
        );
    }

    #[test]
    fn rejects_malformed_dates() {
        assert!(matches!(
            parse_calendar_date("", utc_offset()),
            Err(DeskError::Validation(_))
        ));
        assert!(parse_calendar_date("2025-02-30", utc_offset()).is_err());
        assert!(parse_calendar_date("next tuesday", utc_offset()).is_err());
    }

    #[test]
    fn parses_offsets() {
        assert_eq!(parse_offset("Z").unwrap(), utc_offset());
        assert_eq!(parse_offset("-03:00").unwrap(), west(3));
        assert_eq!(parse_offset("+14:00").unwrap(), east(14));
        assert!(parse_offset("somewhere").is_err());
    }

    fn any_frequency() -> impl Strategy<Value = Frequency> {
        prop_oneof![
            Just(Frequency::Monthly),
            Just(Frequency::Bimonthly),
            Just(Frequency::Quarterly),
            Just(Frequency::Semiannual),
            Just(Frequency::Annual),
        ]
    }

    proptest! {
        #[test]
        fn advance_is_strictly_later_and_offset_independent(
            days in 0i64..60_000,
            frequency in any_frequency(),
            offset_hours in -12i32..=14,
        ) {
            let base = date(1970, 1, 1) + Duration::days(days);
            let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap();
            let at_utc = advance(base, frequency).unwrap();
            prop_assert!(at_utc > base);
            prop_assert_eq!(advance_at(base, frequency, offset).unwrap(), at_utc);
            prop_assert_eq!(advance(base, frequency).unwrap(), at_utc);
        }
    }
}
