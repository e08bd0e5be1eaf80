use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::DocumentType;

/// A clinical document delivered by the ingestion/OCR collaborator.
/// Text arrives already normalized and PHI-redacted; the engine trusts
/// that sanitization. Immutable after ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doc_type: DocumentType,
    pub service_date: NaiveDate,
    pub text: String,
    pub ingested_at: NaiveDateTime,
}
