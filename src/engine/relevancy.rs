//! Document-currency cutoffs.
//!
//! Two independent cutoffs exist and are never conflated:
//! - the per-screening relevancy window, one frequency interval behind
//!   the completion date;
//! - the organization-level medical-data-category currency for labs and
//!   vitals, measured back from today.

use chrono::{Months, NaiveDate};

use crate::models::Frequency;

use super::schedule::{sub_interval, ScheduleError};

/// Cutoff for current evidence: `last_completed - frequency`. Documents
/// dated before this belong to a previous screening cycle.
pub fn evidence_cutoff(
    last_completed: NaiveDate,
    frequency: &Frequency,
) -> Result<NaiveDate, ScheduleError> {
    sub_interval(last_completed, frequency)
}

/// A document dated exactly at the cutoff is still current evidence;
/// one day earlier is not.
pub fn is_current_evidence(service_date: NaiveDate, cutoff: NaiveDate) -> bool {
    service_date >= cutoff
}

/// Organization-level currency cutoff for a medical-data category
/// (labs, vitals), anchored at today.
pub fn data_category_cutoff(today: NaiveDate, currency_months: u32) -> NaiveDate {
    today
        .checked_sub_months(Months::new(currency_months))
        .unwrap_or(NaiveDate::MIN)
}
