//! Keyword canonicalization and fuzzy document matching.

pub mod fuzzy;
pub mod normalize;

pub use fuzzy::{best_match, score_document, ConfidenceTier, KeywordMatch};
pub use normalize::normalize;
