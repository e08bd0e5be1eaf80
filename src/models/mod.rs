pub mod condition;
pub mod document;
pub mod enums;
pub mod explanation;
pub mod instance;
pub mod organization;
pub mod patient;
pub mod variant;

pub use condition::ConditionCode;
pub use document::Document;
pub use explanation::{
    CandidateReview, Criterion, CriterionCheck, DocumentScore, ExplanationPayload,
    MatchExplanation, ResolutionOutcome, StatusDerivation,
};
pub use instance::ScreeningInstance;
pub use organization::Organization;
pub use patient::Patient;
pub use variant::{Frequency, KeywordSet, KeywordTerm, ScreeningVariant};

use thiserror::Error;

/// Definition-time validation failures. A definition that fails here is
/// rejected at save time and never reaches evaluation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("age_min {age_min} exceeds age_max {age_max}")]
    AgeRangeInverted { age_min: u32, age_max: u32 },

    #[error("frequency must be a finite positive number within bounds, got {0}")]
    InvalidFrequency(f64),

    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("not an IANA timezone: {0}")]
    InvalidTimezone(String),

    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition { from: &'static str, to: &'static str },
}
