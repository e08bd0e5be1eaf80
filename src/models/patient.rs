use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::Gender;
use super::ConditionCode;

/// A patient as supplied by EMR sync. Identity is immutable; the coded
/// condition set changes only when sync writes a new snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: Uuid,
    pub organization_id: Uuid,
    /// External EMR identifier, opaque to the engine.
    pub emr_reference: Option<String>,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub conditions: BTreeSet<ConditionCode>,
}

impl Patient {
    /// Age in whole years on the given date. Calendar-aware: the year
    /// ticks on the birthday, not after 365.25 days.
    pub fn age_on(&self, date: NaiveDate) -> u32 {
        date.years_since(self.birth_date).unwrap_or(0)
    }
}
