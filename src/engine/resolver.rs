//! Variant arbitration.
//!
//! Among candidates sharing a base name, the resolver keeps those whose
//! eligibility predicate passes and selects the most specific one using
//! an explicit comparator. The tie-break chain ends at the variant id,
//! so resolution never depends on storage or iteration order. An empty
//! survivor set is a valid outcome, not an error.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::models::enums::Gender;
use crate::models::{CandidateReview, ConditionCode, ResolutionOutcome, ScreeningVariant};

use super::eligibility;

/// Resolve one base name's candidate set for one patient.
/// Returns the selection plus every candidate's review for audit.
pub fn resolve(
    candidates: &[ScreeningVariant],
    gender: Gender,
    age: u32,
    conditions: &BTreeSet<ConditionCode>,
) -> ResolutionOutcome {
    let mut reviews = Vec::with_capacity(candidates.len());
    let mut survivors: Vec<RankedCandidate<'_>> = Vec::new();

    for variant in candidates {
        let outcome = eligibility::evaluate(variant, gender, age, conditions);
        reviews.push(CandidateReview {
            variant_id: variant.id,
            variant_name: variant.name.clone(),
            specificity: variant.specificity(),
            matched_triggers: outcome.matched_triggers,
            eligible: outcome.eligible,
            checks: outcome.checks,
        });
        if outcome.eligible {
            survivors.push(RankedCandidate {
                variant,
                matched_triggers: outcome.matched_triggers,
            });
        }
    }

    survivors.sort_by(rank);
    let selected = survivors.first().map(|s| s.variant.id);

    // Candidate reviews sorted for stable audit output.
    reviews.sort_by(|a, b| a.variant_id.cmp(&b.variant_id));

    ResolutionOutcome { selected, candidates: reviews }
}

struct RankedCandidate<'a> {
    variant: &'a ScreeningVariant,
    matched_triggers: u32,
}

/// Explicit selection order: highest specificity, then most matched
/// trigger conditions, then narrowest age range, then lowest id.
fn rank(a: &RankedCandidate<'_>, b: &RankedCandidate<'_>) -> Ordering {
    b.variant
        .specificity()
        .cmp(&a.variant.specificity())
        .then_with(|| b.matched_triggers.cmp(&a.matched_triggers))
        .then_with(|| a.variant.age_span().cmp(&b.variant.age_span()))
        .then_with(|| a.variant.id.cmp(&b.variant.id))
}
