//! Frequency arithmetic and due-status derivation.
//!
//! Intervals are calendar-aware: whole months honor variable month
//! lengths (day-of-month clamped at month end), and a fractional month
//! remainder is resolved as a day count anchored at the date the whole
//! months land on — never naive multiplication by 365.25. Status is a
//! pure function of (last_completed, frequency, today); recomputation
//! never drifts.

use chrono::{Duration, Months, NaiveDate};
use thiserror::Error;

use crate::models::enums::{FrequencyUnit, ScreeningStatus};
use crate::models::Frequency;

#[derive(Error, Debug)]
pub enum ScheduleError {
    #[error("frequency must be a finite positive number, got {0}")]
    InvalidFrequency(f64),

    #[error("date arithmetic out of range from {start} with {frequency}")]
    OutOfRange { start: NaiveDate, frequency: String },
}

/// `start + frequency`, calendar-aware.
pub fn add_interval(start: NaiveDate, frequency: &Frequency) -> Result<NaiveDate, ScheduleError> {
    shift(start, frequency, true)
}

/// `start - frequency`, the mirror of `add_interval`. Used by the
/// relevancy window calculator.
pub fn sub_interval(start: NaiveDate, frequency: &Frequency) -> Result<NaiveDate, ScheduleError> {
    shift(start, frequency, false)
}

fn shift(start: NaiveDate, frequency: &Frequency, forward: bool) -> Result<NaiveDate, ScheduleError> {
    if !frequency.number.is_finite() || frequency.number <= 0.0 {
        return Err(ScheduleError::InvalidFrequency(frequency.number));
    }

    let out_of_range = || ScheduleError::OutOfRange {
        start,
        frequency: frequency.to_string(),
    };

    match frequency.unit {
        FrequencyUnit::Days | FrequencyUnit::Weeks => {
            let per_unit = if frequency.unit == FrequencyUnit::Weeks { 7.0 } else { 1.0 };
            let days = (frequency.number * per_unit).round() as i64;
            let delta = if forward { days } else { -days };
            start
                .checked_add_signed(Duration::days(delta))
                .ok_or_else(out_of_range)
        }
        FrequencyUnit::Months | FrequencyUnit::Years => {
            // Years convert to months first so 1.5 years is exactly 18
            // calendar months, not 548 days.
            let months = match frequency.as_months() {
                Some(m) => m,
                None => return Err(ScheduleError::InvalidFrequency(frequency.number)),
            };
            shift_months(start, months, forward).ok_or_else(out_of_range)
        }
    }
}

/// Add or subtract a possibly fractional month count. Whole months move
/// calendar-aware; the fractional remainder becomes a day count measured
/// over the following (or preceding) anchored month.
fn shift_months(start: NaiveDate, months: f64, forward: bool) -> Option<NaiveDate> {
    let whole = months.trunc() as u32;
    let frac = months.fract();

    let anchored = if forward {
        start.checked_add_months(Months::new(whole))?
    } else {
        start.checked_sub_months(Months::new(whole))?
    };

    if frac == 0.0 {
        return Some(anchored);
    }

    let (period_start, period_end) = if forward {
        (anchored, anchored.checked_add_months(Months::new(1))?)
    } else {
        (anchored.checked_sub_months(Months::new(1))?, anchored)
    };
    let span_days = (period_end - period_start).num_days();
    let frac_days = (frac * span_days as f64).round() as i64;

    if forward {
        anchored.checked_add_signed(Duration::days(frac_days))
    } else {
        anchored.checked_sub_signed(Duration::days(frac_days))
    }
}

/// Next due date from the completion date, or None when the screening
/// was never completed (immediately due).
pub fn next_due_date(
    last_completed: Option<NaiveDate>,
    frequency: &Frequency,
) -> Result<Option<NaiveDate>, ScheduleError> {
    match last_completed {
        Some(date) => Ok(Some(add_interval(date, frequency)?)),
        None => Ok(None),
    }
}

/// Derive (status, next_due) for `today`.
pub fn status_on(
    last_completed: Option<NaiveDate>,
    frequency: &Frequency,
    today: NaiveDate,
    lookahead_days: u32,
) -> Result<(ScreeningStatus, Option<NaiveDate>), ScheduleError> {
    let Some(completed) = last_completed else {
        return Ok((ScreeningStatus::Due, None));
    };

    let next_due = add_interval(completed, frequency)?;
    let lookahead_start = next_due - Duration::days(lookahead_days as i64);

    let status = if today >= next_due {
        ScreeningStatus::Overdue
    } else if today >= lookahead_start {
        ScreeningStatus::DueSoon
    } else {
        ScreeningStatus::Compliant
    };
    Ok((status, Some(next_due)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn one_and_a_half_years_is_eighteen_calendar_months() {
        let freq = Frequency::new(1.5, FrequencyUnit::Years);
        assert_eq!(add_interval(d(2023, 1, 10), &freq).unwrap(), d(2024, 7, 10));
    }

    #[test]
    fn status_around_a_fractional_year_due_date() {
        let freq = Frequency::new(1.5, FrequencyUnit::Years);
        let completed = Some(d(2023, 1, 10));

        let (status, next) = status_on(completed, &freq, d(2024, 7, 1), 30).unwrap();
        assert_eq!(next, Some(d(2024, 7, 10)));
        assert_eq!(status, ScreeningStatus::DueSoon);

        let (status, _) = status_on(completed, &freq, d(2024, 7, 15), 30).unwrap();
        assert_eq!(status, ScreeningStatus::Overdue);
    }

    #[test]
    fn due_date_itself_is_overdue() {
        let freq = Frequency::new(1.5, FrequencyUnit::Years);
        let (status, _) = status_on(Some(d(2023, 1, 10)), &freq, d(2024, 7, 10), 30).unwrap();
        assert_eq!(status, ScreeningStatus::Overdue);
    }

    #[test]
    fn well_before_lookahead_is_compliant() {
        let freq = Frequency::new(1.5, FrequencyUnit::Years);
        let (status, _) = status_on(Some(d(2023, 1, 10)), &freq, d(2023, 6, 1), 30).unwrap();
        assert_eq!(status, ScreeningStatus::Compliant);
    }

    #[test]
    fn never_completed_is_due() {
        let freq = Frequency::new(1.0, FrequencyUnit::Years);
        let (status, next) = status_on(None, &freq, d(2024, 1, 1), 30).unwrap();
        assert_eq!(status, ScreeningStatus::Due);
        assert_eq!(next, None);
    }

    #[test]
    fn month_end_clamps() {
        let freq = Frequency::new(1.0, FrequencyUnit::Months);
        assert_eq!(add_interval(d(2023, 1, 31), &freq).unwrap(), d(2023, 2, 28));
        assert_eq!(add_interval(d(2024, 1, 31), &freq).unwrap(), d(2024, 2, 29));
    }

    #[test]
    fn half_month_counts_days_of_the_anchored_month() {
        let freq = Frequency::new(0.5, FrequencyUnit::Months);
        // From 2023-04-01: anchored month 2023-04-01..2023-05-01 has 30
        // days, half is 15.
        assert_eq!(add_interval(d(2023, 4, 1), &freq).unwrap(), d(2023, 4, 16));
        // From 2023-02-01: 28-day month, half is 14.
        assert_eq!(add_interval(d(2023, 2, 1), &freq).unwrap(), d(2023, 2, 15));
    }

    #[test]
    fn weeks_and_days_are_exact_day_arithmetic() {
        assert_eq!(
            add_interval(d(2024, 2, 26), &Frequency::new(1.0, FrequencyUnit::Weeks)).unwrap(),
            d(2024, 3, 4)
        );
        assert_eq!(
            add_interval(d(2024, 12, 30), &Frequency::new(3.0, FrequencyUnit::Days)).unwrap(),
            d(2025, 1, 2)
        );
    }

    #[test]
    fn subtraction_mirrors_addition_for_whole_months() {
        let freq = Frequency::new(18.0, FrequencyUnit::Months);
        assert_eq!(sub_interval(d(2024, 7, 10), &freq).unwrap(), d(2023, 1, 10));
    }

    #[test]
    fn idempotent_recomputation() {
        let freq = Frequency::new(2.5, FrequencyUnit::Years);
        let first = status_on(Some(d(2022, 3, 14)), &freq, d(2024, 8, 1), 30).unwrap();
        let second = status_on(Some(d(2022, 3, 14)), &freq, d(2024, 8, 1), 30).unwrap();
        assert_eq!(first.0, second.0);
        assert_eq!(first.1, second.1);
    }

    #[test]
    fn invalid_frequency_is_an_error() {
        for bad in [0.0, -2.0, f64::NAN] {
            let freq = Frequency::new(bad, FrequencyUnit::Years);
            assert!(add_interval(d(2024, 1, 1), &freq).is_err());
        }
    }
}
