//! Run-start snapshots and the storage contract.
//!
//! A batch run reads the Active variant set exactly once, at start;
//! concurrent administrative edits never affect in-flight computations.
//! Per-patient snapshots are the only other read, and the per-patient
//! instance write is the only write — all behind `EngineStore` so the
//! batch runner never touches SQL directly.

use std::collections::BTreeMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use uuid::Uuid;

use crate::db::repository::{document, explanation, instance, organization, patient, variant};
use crate::db::DatabaseError;
use crate::models::{
    Document, MatchExplanation, Organization, Patient, ScreeningInstance, ScreeningVariant,
};

use super::EngineError;

/// Immutable view of the Active variant set, grouped by base name.
#[derive(Debug, Clone)]
pub struct VariantSnapshot {
    by_base: BTreeMap<String, Vec<ScreeningVariant>>,
    pub taken_at: DateTime<Utc>,
}

impl VariantSnapshot {
    pub fn new(active: Vec<ScreeningVariant>, taken_at: DateTime<Utc>) -> Self {
        let mut by_base: BTreeMap<String, Vec<ScreeningVariant>> = BTreeMap::new();
        for v in active {
            by_base.entry(v.base_name.clone()).or_default().push(v);
        }
        Self { by_base, taken_at }
    }

    /// Base names in sorted order.
    pub fn base_names(&self) -> impl Iterator<Item = &str> {
        self.by_base.keys().map(String::as_str)
    }

    pub fn candidates(&self, base_name: &str) -> &[ScreeningVariant] {
        self.by_base.get(base_name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn variant(&self, id: &Uuid) -> Option<&ScreeningVariant> {
        self.by_base.values().flatten().find(|v| v.id == *id)
    }

    pub fn len(&self) -> usize {
        self.by_base.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_base.is_empty()
    }
}

/// One patient's consistent read for a run: demographics, documents,
/// and the previously persisted instance set (dormancy carry-over and
/// signature comparison both need it).
#[derive(Debug, Clone)]
pub struct PatientSnapshot {
    pub patient: Patient,
    pub documents: Vec<Document>,
    pub existing_instances: Vec<ScreeningInstance>,
}

/// Storage contract the batch runner works against. Implementations
/// must be shareable across worker tasks.
pub trait EngineStore: Send + Sync {
    /// The Active variant set at run start. Failure here is fatal for
    /// the whole run.
    fn variant_snapshot(&self) -> Result<VariantSnapshot, EngineError>;

    fn organization(&self, id: &Uuid) -> Result<Organization, EngineError>;

    fn patient_ids(&self) -> Result<Vec<Uuid>, EngineError>;

    fn patient_snapshot(&self, id: &Uuid) -> Result<PatientSnapshot, EngineError>;

    /// Replace one patient's instance set and append the run's
    /// explanations, atomically.
    fn replace_instances(
        &self,
        patient_id: &Uuid,
        instances: &[ScreeningInstance],
        explanations: &[MatchExplanation],
    ) -> Result<instance::WriteOutcome, EngineError>;

    /// Documents whose patient is missing from the snapshot; logged and
    /// skipped for the run.
    fn orphan_document_ids(&self) -> Result<Vec<Uuid>, EngineError>;

    /// Read side for audit replay.
    fn explanations_for_patient(
        &self,
        patient_id: &Uuid,
    ) -> Result<Vec<MatchExplanation>, EngineError>;
}

/// SQLite-backed store. A single connection guarded by a mutex: worker
/// tasks compute outside the lock and only hold it at data-retrieval
/// and write boundaries.
pub struct SqliteEngineStore {
    conn: Mutex<Connection>,
}

impl SqliteEngineStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn: Mutex::new(conn) }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, EngineError> {
        self.conn
            .lock()
            .map_err(|_| EngineError::StorePoisoned)
    }
}

impl EngineStore for SqliteEngineStore {
    fn variant_snapshot(&self) -> Result<VariantSnapshot, EngineError> {
        let conn = self.lock()?;
        let active = variant::list_active_variants(&conn)
            .map_err(|e| EngineError::SnapshotUnavailable(e.to_string()))?;
        Ok(VariantSnapshot::new(active, Utc::now()))
    }

    fn organization(&self, id: &Uuid) -> Result<Organization, EngineError> {
        let conn = self.lock()?;
        Ok(organization::get_organization(&conn, id)?)
    }

    fn patient_ids(&self) -> Result<Vec<Uuid>, EngineError> {
        let conn = self.lock()?;
        Ok(patient::list_patient_ids(&conn)?)
    }

    fn patient_snapshot(&self, id: &Uuid) -> Result<PatientSnapshot, EngineError> {
        let conn = self.lock()?;
        let loaded = patient::get_patient(&conn, id).map_err(|e| match e {
            DatabaseError::NotFound { .. } => EngineError::UnknownPatient(*id),
            other => other.into(),
        })?;
        let documents = document::documents_for_patient(&conn, id)?;
        let existing_instances = instance::instances_for_patient(&conn, id)?;
        Ok(PatientSnapshot {
            patient: loaded,
            documents,
            existing_instances,
        })
    }

    fn replace_instances(
        &self,
        patient_id: &Uuid,
        instances: &[ScreeningInstance],
        explanations: &[MatchExplanation],
    ) -> Result<instance::WriteOutcome, EngineError> {
        let mut conn = self.lock()?;
        Ok(instance::replace_patient_instances(
            &mut conn,
            patient_id,
            instances,
            explanations,
        )?)
    }

    fn orphan_document_ids(&self) -> Result<Vec<Uuid>, EngineError> {
        let conn = self.lock()?;
        Ok(document::orphan_document_ids(&conn)?)
    }

    fn explanations_for_patient(
        &self,
        patient_id: &Uuid,
    ) -> Result<Vec<MatchExplanation>, EngineError> {
        let conn = self.lock()?;
        Ok(explanation::explanations_for_patient(&conn, patient_id)?)
    }
}
