//! Immutable decision traces.
//!
//! One `MatchExplanation` is recorded per recomputation of a screening
//! instance. Records are append-only: the repository exposes insert and
//! read, never update, so a point-in-time audit can replay any decision
//! without re-running the matching pipeline.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matching::fuzzy::KeywordMatch;

use super::enums::ScreeningStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchExplanation {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub base_name: String,
    pub run_id: Uuid,
    pub recorded_at: NaiveDateTime,
    pub payload: ExplanationPayload,
}

/// Everything the engine considered for one (patient, base_name) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplanationPayload {
    pub resolution: ResolutionOutcome,
    pub document_scores: Vec<DocumentScore>,
    /// Absent when no variant applied or evaluation was gated.
    pub derivation: Option<StatusDerivation>,
}

/// Resolver output: zero or one selected variant plus every candidate
/// with its pass/fail reasons.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionOutcome {
    pub selected: Option<Uuid>,
    pub candidates: Vec<CandidateReview>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateReview {
    pub variant_id: Uuid,
    pub variant_name: String,
    pub specificity: u32,
    pub matched_triggers: u32,
    pub eligible: bool,
    pub checks: Vec<CriterionCheck>,
}

/// Which eligibility criterion a check covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Gender,
    AgeRange,
    TriggerConditions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionCheck {
    pub criterion: Criterion,
    pub passed: bool,
    pub detail: String,
}

/// Fuzzy score of one document against the selected variant's keywords,
/// with the two currency gates recorded separately. `counted` is true
/// only when the match tier and both applicable gates allow it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentScore {
    pub document_id: Uuid,
    pub service_date: NaiveDate,
    pub best_match: Option<KeywordMatch>,
    pub within_relevancy_window: bool,
    pub within_category_currency: bool,
    pub counted: bool,
}

/// How the final status was derived from the frequency arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusDerivation {
    pub last_completed_date: Option<NaiveDate>,
    pub next_due_date: Option<NaiveDate>,
    pub evidence_cutoff: Option<NaiveDate>,
    pub lookahead_days: u32,
    pub status: ScreeningStatus,
    /// Present only on ComputationFailure ("unresolved").
    pub failure: Option<String>,
}
