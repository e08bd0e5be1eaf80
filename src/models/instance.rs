//! The per-patient resolved state of one screening.
//!
//! Instances are recomputed on every refresh; the content signature lets
//! the writer skip rows whose derived state did not change.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::enums::ScreeningStatus;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningInstance {
    pub patient_id: Uuid,
    pub base_name: String,
    /// None when no variant applied ("no applicable screening").
    pub variant_id: Option<Uuid>,
    pub status: ScreeningStatus,
    pub last_completed_date: Option<NaiveDate>,
    /// Always re-derivable from `last_completed_date` + frequency;
    /// stored for readers, never an independent source of truth.
    pub next_due_date: Option<NaiveDate>,
    /// Set by the appointment flow; evaluation is gated until local
    /// midnight after this date in the organization's timezone.
    pub dormant_through: Option<NaiveDate>,
    /// Sorted ids of documents counted as current evidence.
    pub matched_documents: Vec<Uuid>,
    pub explanation_id: Option<Uuid>,
    pub updated_at: NaiveDateTime,
}

impl ScreeningInstance {
    /// SHA-256 over the derived content. Excludes `explanation_id` and
    /// `updated_at` so an unchanged recomputation produces an identical
    /// signature.
    pub fn content_signature(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.base_name.as_bytes());
        hasher.update(b"|");
        hasher.update(
            self.variant_id
                .map(|id| id.to_string())
                .unwrap_or_default()
                .as_bytes(),
        );
        hasher.update(b"|");
        hasher.update(self.status.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(fmt_date(self.last_completed_date).as_bytes());
        hasher.update(b"|");
        hasher.update(fmt_date(self.next_due_date).as_bytes());
        hasher.update(b"|");
        hasher.update(fmt_date(self.dormant_through).as_bytes());
        for doc_id in &self.matched_documents {
            hasher.update(b"|");
            hasher.update(doc_id.to_string().as_bytes());
        }
        let digest = hasher.finalize();
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

fn fmt_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}
