//! Dormancy rollover clock.
//!
//! An appointment-driven dormant instance re-enters evaluation at local
//! midnight after its dormant-through date, in the organization's IANA
//! timezone. Wall-clock local time only: a fixed UTC offset or server
//! time would roll over at the wrong hour twice a year.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Upper bound when scanning past a DST gap, in minutes. No real zone
/// skips more than two hours at a transition.
const MAX_GAP_SCAN_MINUTES: i64 = 180;

/// UTC instant of local midnight at the start of `date` in `tz`.
///
/// DST handling: an ambiguous local midnight (clocks fell back) takes
/// the earlier instant; a nonexistent local midnight (clocks sprang
/// forward over it) advances to the first valid wall-clock minute.
pub fn local_midnight_utc(date: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let mut local = date.and_time(NaiveTime::MIN);
    for _ in 0..MAX_GAP_SCAN_MINUTES {
        match tz.from_local_datetime(&local) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => local += Duration::minutes(1),
        }
    }
    // Unreachable for IANA zones; fall back to reading the naive time
    // as UTC rather than panicking.
    Utc.from_utc_datetime(&local)
}

/// The instant a dormant instance re-enters evaluation: local midnight
/// at the start of the day after `dormant_through`.
pub fn reactivation_instant(dormant_through: NaiveDate, tz: Tz) -> DateTime<Utc> {
    let next_day = dormant_through
        .checked_add_signed(Duration::days(1))
        .unwrap_or(NaiveDate::MAX);
    local_midnight_utc(next_day, tz)
}

/// Whether evaluation is still gated at `now`.
pub fn is_dormant(dormant_through: Option<NaiveDate>, tz: Tz, now: DateTime<Utc>) -> bool {
    match dormant_through {
        Some(through) => now < reactivation_instant(through, tz),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::{New_York, Santiago};
    use chrono_tz::Europe::Paris;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn utc(y: i32, m: u32, day: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, day, h, min, 0).unwrap()
    }

    #[test]
    fn paris_midnight_shifts_with_season() {
        // Winter: UTC+1, midnight local is 23:00 UTC the day before.
        assert_eq!(local_midnight_utc(d(2024, 1, 15), Paris), utc(2024, 1, 14, 23, 0));
        // Summer: UTC+2.
        assert_eq!(local_midnight_utc(d(2024, 7, 15), Paris), utc(2024, 7, 14, 22, 0));
    }

    #[test]
    fn santiago_skipped_midnight_advances_to_first_valid_minute() {
        // Chile DST starts 2024-09-08: 00:00 local does not exist,
        // clocks jump straight to 01:00.
        let instant = local_midnight_utc(d(2024, 9, 8), Santiago);
        let local = instant.with_timezone(&Santiago);
        assert_eq!(local.time(), NaiveTime::from_hms_opt(1, 0, 0).unwrap());
        assert_eq!(local.date_naive(), d(2024, 9, 8));
    }

    #[test]
    fn reactivation_is_midnight_after_dormant_through() {
        // 2024-06-10 in New York (EDT, UTC-4): midnight of the 11th is
        // 04:00 UTC.
        assert_eq!(
            reactivation_instant(d(2024, 6, 10), New_York),
            utc(2024, 6, 11, 4, 0)
        );
    }

    #[test]
    fn dormant_until_local_midnight_not_server_midnight() {
        let through = d(2024, 6, 10);
        // 00:30 UTC on the 11th is still 20:30 on the 10th in New York.
        assert!(is_dormant(Some(through), New_York, utc(2024, 6, 11, 0, 30)));
        // 04:00 UTC is exactly local midnight: no longer dormant.
        assert!(!is_dormant(Some(through), New_York, utc(2024, 6, 11, 4, 0)));
    }

    #[test]
    fn no_dormant_date_means_not_dormant() {
        assert!(!is_dormant(None, New_York, utc(2024, 6, 11, 0, 0)));
    }
}
