//! Screening variant definitions — the administrator-authored rules the
//! resolver arbitrates between.
//!
//! Variants sharing a `base_name` compete for the same conceptual
//! screening (e.g. "Mammogram"); the resolver selects at most one per
//! patient. Contradictory definitions are rejected here at save time so
//! evaluation never sees them.

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matching::normalize::normalize;

use super::enums::{FrequencyUnit, Gender, VariantState};
use super::{ConditionCode, ConfigError};

/// Longest interval a screening frequency may express, in months.
/// Guards the calendar arithmetic against absurd administrator input.
const MAX_FREQUENCY_MONTHS: f64 = 1_200.0;

/// How often a screening recurs. The number may be fractional
/// (1.5 years, 0.5 months); calendar interpretation lives in
/// `engine::schedule`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frequency {
    pub number: f64,
    pub unit: FrequencyUnit,
}

impl Frequency {
    pub fn new(number: f64, unit: FrequencyUnit) -> Self {
        Self { number, unit }
    }

    /// Interval expressed in months, for units where that is exact.
    pub fn as_months(&self) -> Option<f64> {
        match self.unit {
            FrequencyUnit::Months => Some(self.number),
            FrequencyUnit::Years => Some(self.number * 12.0),
            FrequencyUnit::Days | FrequencyUnit::Weeks => None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.number.is_finite() || self.number <= 0.0 {
            return Err(ConfigError::InvalidFrequency(self.number));
        }
        if let Some(months) = self.as_months() {
            if months > MAX_FREQUENCY_MONTHS {
                return Err(ConfigError::InvalidFrequency(self.number));
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Frequency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.number, self.unit.as_str())
    }
}

/// One configured keyword with its administrator-approved aliases.
/// Everything is normalized at construction; the matcher never
/// re-normalizes configured terms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordTerm {
    pub term: String,
    pub aliases: Vec<String>,
}

impl KeywordTerm {
    pub fn new(term: &str, aliases: &[&str]) -> Self {
        let mut normalized_aliases: Vec<String> = aliases
            .iter()
            .map(|a| normalize(a))
            .filter(|a| !a.is_empty())
            .collect();
        normalized_aliases.sort();
        normalized_aliases.dedup();
        Self {
            term: normalize(term),
            aliases: normalized_aliases,
        }
    }

    /// Canonical term followed by its aliases, all normalized.
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.term.as_str()).chain(self.aliases.iter().map(String::as_str))
    }
}

/// The keyword set a variant matches documents against. Terms are kept
/// sorted so matcher output order never depends on configuration order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct KeywordSet {
    terms: Vec<KeywordTerm>,
}

impl KeywordSet {
    pub fn new(terms: impl IntoIterator<Item = KeywordTerm>) -> Self {
        let mut terms: Vec<KeywordTerm> = terms.into_iter().filter(|t| !t.term.is_empty()).collect();
        terms.sort_by(|a, b| a.term.cmp(&b.term));
        terms.dedup_by(|a, b| a.term == b.term);
        Self { terms }
    }

    pub fn terms(&self) -> &[KeywordTerm] {
        &self.terms
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// A fully specified screening definition under a base name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningVariant {
    pub id: Uuid,
    pub base_name: String,
    pub name: String,
    /// None = applies to all genders.
    pub gender: Option<Gender>,
    /// Inclusive age bounds in whole years; None = unbounded.
    pub age_min: Option<u32>,
    pub age_max: Option<u32>,
    /// Empty set = universal fallback (no condition required).
    pub trigger_conditions: BTreeSet<ConditionCode>,
    pub frequency: Frequency,
    pub keywords: KeywordSet,
    pub state: VariantState,
    pub created_at: NaiveDateTime,
    pub archived_at: Option<NaiveDateTime>,
}

/// Widest representable age span, used when a bound is open.
const OPEN_AGE_SPAN: u32 = u32::MAX;

impl ScreeningVariant {
    /// Definition-time validation. A variant that fails here is never
    /// persisted and therefore never reaches evaluation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_name.trim().is_empty() {
            return Err(ConfigError::MissingField("base_name"));
        }
        if self.name.trim().is_empty() {
            return Err(ConfigError::MissingField("name"));
        }
        if self.keywords.is_empty() {
            return Err(ConfigError::MissingField("keywords"));
        }
        if let (Some(min), Some(max)) = (self.age_min, self.age_max) {
            if min > max {
                return Err(ConfigError::AgeRangeInverted { age_min: min, age_max: max });
            }
        }
        self.frequency.validate()
    }

    /// How narrowly this variant's eligibility criteria are defined.
    /// Strictly monotonic: adding any constraint raises the score, and a
    /// variant requiring a trigger condition outranks an otherwise
    /// identical one that does not.
    pub fn specificity(&self) -> u32 {
        let mut score = 0;
        if self.gender.is_some() {
            score += 1;
        }
        if self.age_min.is_some() {
            score += 1;
        }
        if self.age_max.is_some() {
            score += 1;
        }
        score + 2 * self.trigger_conditions.len() as u32
    }

    /// Span of the age range in years; open bounds count as widest.
    /// Used only by the resolver's tie-break comparator.
    pub fn age_span(&self) -> u32 {
        match (self.age_min, self.age_max) {
            (Some(min), Some(max)) => max.saturating_sub(min),
            _ => OPEN_AGE_SPAN,
        }
    }
}
