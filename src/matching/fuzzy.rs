//! Fuzzy keyword scoring over document text.
//!
//! Each configured keyword (and its administrator-approved aliases) is
//! scored against sliding windows of document tokens using normalized
//! Levenshtein similarity. Synonym tolerance is alias-list only; there
//! is no open-ended inference, which keeps false positives bounded.
//! Identical inputs always yield identical classification.

use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use crate::models::variant::KeywordSet;

use super::normalize::{normalize, tokenize};

/// Similarity at or above this is a high-confidence match.
pub const HIGH_CONFIDENCE: f64 = 0.85;
/// Similarity at or above this (but below high) is a medium-confidence
/// match. Below it, the keyword did not match.
pub const MEDIUM_CONFIDENCE: f64 = 0.60;

/// Confidence classification of a keyword score. Ordered so that
/// `None < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceTier {
    None,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_CONFIDENCE {
            Self::High
        } else if score >= MEDIUM_CONFIDENCE {
            Self::Medium
        } else {
            Self::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    /// Whether this tier counts as a match at all.
    pub fn is_match(&self) -> bool {
        *self >= Self::Medium
    }
}

/// Best score of one keyword term against a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeywordMatch {
    /// Canonical (normalized) keyword term.
    pub keyword: String,
    /// The winning token window, normalized. Empty when the document
    /// had no tokens.
    pub matched_text: String,
    pub score: f64,
    pub tier: ConfidenceTier,
}

/// Score every keyword in the set against the document text.
/// Output order follows the set's sorted term order, never
/// configuration or iteration order.
pub fn score_document(text: &str, keywords: &KeywordSet) -> Vec<KeywordMatch> {
    let normalized = normalize(text);
    let doc_tokens = tokenize(&normalized);

    keywords
        .terms()
        .iter()
        .map(|term| {
            let mut best_score = 0.0_f64;
            let mut best_window = String::new();

            for candidate in term.candidates() {
                let (score, window) = score_candidate(candidate, &doc_tokens);
                // Strictly greater keeps the leftmost window and the
                // canonical term ahead of aliases on ties.
                if score > best_score {
                    best_score = score;
                    best_window = window;
                }
            }

            KeywordMatch {
                keyword: term.term.clone(),
                matched_text: best_window,
                score: best_score,
                tier: ConfidenceTier::from_score(best_score),
            }
        })
        .collect()
}

/// The single strongest keyword match for a document, or None when the
/// set is empty. Ties resolve to the first term in sorted order.
pub fn best_match(text: &str, keywords: &KeywordSet) -> Option<KeywordMatch> {
    let mut best: Option<KeywordMatch> = None;
    for m in score_document(text, keywords) {
        let better = match &best {
            None => true,
            Some(b) => (m.tier, m.score) > (b.tier, b.score),
        };
        if better {
            best = Some(m);
        }
    }
    best
}

/// Slide a window of the candidate's token count across the document and
/// keep the best similarity. A document shorter than the window is
/// compared whole.
fn score_candidate(candidate: &str, doc_tokens: &[&str]) -> (f64, String) {
    let window_len = candidate.split(' ').count();
    if doc_tokens.is_empty() {
        return (0.0, String::new());
    }

    let mut best_score = 0.0_f64;
    let mut best_window = String::new();

    if doc_tokens.len() <= window_len {
        let window = doc_tokens.join(" ");
        let score = normalized_levenshtein(&window, candidate);
        return (score, window);
    }

    for start in 0..=(doc_tokens.len() - window_len) {
        let window = doc_tokens[start..start + window_len].join(" ");
        let score = normalized_levenshtein(&window, candidate);
        if score > best_score {
            best_score = score;
            best_window = window;
        }
    }

    (best_score, best_window)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::variant::KeywordTerm;

    fn set(terms: &[(&str, &[&str])]) -> KeywordSet {
        KeywordSet::new(terms.iter().map(|(t, a)| KeywordTerm::new(t, a)))
    }

    #[test]
    fn exact_token_window_is_high_confidence() {
        let keywords = set(&[("breast_mri", &[])]);
        let m = best_match("Patient underwent Breast MRI without contrast", &keywords).unwrap();
        assert_eq!(m.keyword, "breast mri");
        assert_eq!(m.matched_text, "breast mri");
        assert_eq!(m.tier, ConfidenceTier::High);
        assert!((m.score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn single_typo_still_high_confidence() {
        let keywords = set(&[("mammogram", &[])]);
        let m = best_match("bilateral mamogram performed", &keywords).unwrap();
        assert_eq!(m.tier, ConfidenceTier::High);
    }

    #[test]
    fn near_term_scores_medium() {
        let keywords = set(&[("colonoscopy", &[])]);
        let m = best_match("colonoscopic examination of the sigmoid", &keywords).unwrap();
        assert_eq!(m.tier, ConfidenceTier::Medium);
    }

    #[test]
    fn unrelated_text_is_no_match() {
        let keywords = set(&[("colonoscopy", &[])]);
        let m = best_match("chest radiograph two views", &keywords).unwrap();
        assert_eq!(m.tier, ConfidenceTier::None);
        assert!(!m.tier.is_match());
    }

    #[test]
    fn configured_alias_matches() {
        let keywords = set(&[("dexa scan", &["bone density scan"])]);
        let m = best_match("Bone density scan results within normal limits", &keywords).unwrap();
        assert_eq!(m.keyword, "dexa scan");
        assert_eq!(m.matched_text, "bone density scan");
        assert_eq!(m.tier, ConfidenceTier::High);
    }

    #[test]
    fn unconfigured_synonym_does_not_match() {
        // "densitometry" is a real synonym but not a configured alias;
        // bounded tolerance must reject it.
        let keywords = set(&[("dexa scan", &[])]);
        let m = best_match("bone densitometry performed", &keywords).unwrap();
        assert_eq!(m.tier, ConfidenceTier::None);
    }

    #[test]
    fn deterministic_across_runs() {
        let keywords = set(&[("breast_mri", &["mri breast"]), ("mammogram", &[])]);
        let text = "Breast MRI and screening mamogram reviewed";
        let a = score_document(text, &keywords);
        let b = score_document(text, &keywords);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.keyword, y.keyword);
            assert_eq!(x.score, y.score);
            assert_eq!(x.tier, y.tier);
        }
    }

    #[test]
    fn tier_thresholds_are_inclusive() {
        assert_eq!(ConfidenceTier::from_score(0.85), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(0.849), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.60), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.599), ConfidenceTier::None);
    }

    #[test]
    fn empty_document_scores_zero() {
        let keywords = set(&[("mammogram", &[])]);
        let m = best_match("", &keywords).unwrap();
        assert_eq!(m.score, 0.0);
        assert_eq!(m.tier, ConfidenceTier::None);
        assert!(m.matched_text.is_empty());
    }

    #[test]
    fn document_shorter_than_window_compared_whole() {
        let keywords = set(&[("bone density scan", &[])]);
        let m = best_match("density scan", &keywords).unwrap();
        assert!(m.score > 0.6, "partial phrase should score above medium floor");
    }
}
