//! The shared gender/age/condition predicate.
//!
//! This is the single code path for applicability: the resolver's
//! candidate filter and standalone previews both call `evaluate`, so
//! the two can never diverge.

use std::collections::BTreeSet;

use crate::models::enums::Gender;
use crate::models::{ConditionCode, Criterion, CriterionCheck, ScreeningVariant};

/// Result of checking one variant against one patient.
#[derive(Debug, Clone)]
pub struct EligibilityOutcome {
    pub eligible: bool,
    /// How many of the variant's trigger conditions the patient carries.
    pub matched_triggers: u32,
    pub checks: Vec<CriterionCheck>,
}

/// Evaluate the applicability predicate for one variant.
///
/// - Gender: passes when the variant has no gender criterion or it
///   equals the patient's marker.
/// - Age: inclusive bounds; a missing bound is unbounded.
/// - Trigger conditions: an empty set is a universal fallback; otherwise
///   the patient must carry at least one listed condition.
pub fn evaluate(
    variant: &ScreeningVariant,
    gender: Gender,
    age: u32,
    conditions: &BTreeSet<ConditionCode>,
) -> EligibilityOutcome {
    let mut checks = Vec::with_capacity(3);

    let gender_pass = match variant.gender {
        None => true,
        Some(required) => required == gender,
    };
    checks.push(CriterionCheck {
        criterion: Criterion::Gender,
        passed: gender_pass,
        detail: match variant.gender {
            None => "no gender criterion".into(),
            Some(required) => format!(
                "requires {}, patient is {}",
                required.as_str(),
                gender.as_str()
            ),
        },
    });

    let min_ok = variant.age_min.map_or(true, |min| age >= min);
    let max_ok = variant.age_max.map_or(true, |max| age <= max);
    let age_pass = min_ok && max_ok;
    checks.push(CriterionCheck {
        criterion: Criterion::AgeRange,
        passed: age_pass,
        detail: format!(
            "patient age {age}, range {}..={}",
            variant.age_min.map(|v| v.to_string()).unwrap_or_else(|| "*".into()),
            variant.age_max.map(|v| v.to_string()).unwrap_or_else(|| "*".into()),
        ),
    });

    let matched: Vec<&ConditionCode> = variant
        .trigger_conditions
        .intersection(conditions)
        .collect();
    let trigger_pass = variant.trigger_conditions.is_empty() || !matched.is_empty();
    checks.push(CriterionCheck {
        criterion: Criterion::TriggerConditions,
        passed: trigger_pass,
        detail: if variant.trigger_conditions.is_empty() {
            "universal fallback, no trigger required".into()
        } else {
            format!(
                "{} of {} trigger conditions present",
                matched.len(),
                variant.trigger_conditions.len()
            )
        },
    });

    EligibilityOutcome {
        eligible: gender_pass && age_pass && trigger_pass,
        matched_triggers: matched.len() as u32,
        checks,
    }
}
