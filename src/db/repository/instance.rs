//! Screening-instance persistence.
//!
//! A patient's instance set is replaced atomically: one transaction
//! deletes instances whose base name disappeared, upserts changed rows,
//! and appends the run's explanations. Rows whose content signature is
//! unchanged are left untouched, keeping refresh writes cheap.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Transaction};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::ScreeningStatus;
use crate::models::{MatchExplanation, ScreeningInstance};

use super::explanation::insert_explanation_tx;
use super::organization::parse_uuid;

/// Outcome of one patient's instance write.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteOutcome {
    pub written: usize,
    pub unchanged: usize,
}

/// Replace one patient's instance set, all-or-nothing. Explanations are
/// appended in the same transaction so an aborted write leaves no trace.
pub fn replace_patient_instances(
    conn: &mut Connection,
    patient_id: &Uuid,
    instances: &[ScreeningInstance],
    explanations: &[MatchExplanation],
) -> Result<WriteOutcome, DatabaseError> {
    let tx = conn.transaction()?;
    let outcome = replace_in_tx(&tx, patient_id, instances, explanations)?;
    tx.commit()?;
    Ok(outcome)
}

fn replace_in_tx(
    tx: &Transaction<'_>,
    patient_id: &Uuid,
    instances: &[ScreeningInstance],
    explanations: &[MatchExplanation],
) -> Result<WriteOutcome, DatabaseError> {
    let existing = existing_signatures(tx, patient_id)?;

    // Drop instances whose base name no longer resolves to anything.
    let kept: Vec<&str> = instances.iter().map(|i| i.base_name.as_str()).collect();
    for base_name in existing.keys() {
        if !kept.contains(&base_name.as_str()) {
            tx.execute(
                "DELETE FROM screening_instances WHERE patient_id = ?1 AND base_name = ?2",
                params![patient_id.to_string(), base_name],
            )?;
        }
    }

    let mut outcome = WriteOutcome::default();
    for instance in instances {
        let signature = instance.content_signature();
        if existing.get(&instance.base_name) == Some(&signature) {
            outcome.unchanged += 1;
            continue;
        }
        upsert_instance(tx, instance, &signature)?;
        outcome.written += 1;
    }

    for explanation in explanations {
        insert_explanation_tx(tx, explanation)?;
    }

    Ok(outcome)
}

fn existing_signatures(
    tx: &Transaction<'_>,
    patient_id: &Uuid,
) -> Result<HashMap<String, String>, DatabaseError> {
    let mut stmt = tx.prepare(
        "SELECT base_name, signature FROM screening_instances WHERE patient_id = ?1",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;

    let mut map = HashMap::new();
    for row in rows {
        let (base_name, signature) = row?;
        map.insert(base_name, signature);
    }
    Ok(map)
}

fn upsert_instance(
    tx: &Transaction<'_>,
    instance: &ScreeningInstance,
    signature: &str,
) -> Result<(), DatabaseError> {
    tx.execute(
        "INSERT INTO screening_instances
         (patient_id, base_name, variant_id, status, last_completed_date, next_due_date,
          dormant_through, explanation_id, signature, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(patient_id, base_name) DO UPDATE SET
           variant_id = excluded.variant_id,
           status = excluded.status,
           last_completed_date = excluded.last_completed_date,
           next_due_date = excluded.next_due_date,
           dormant_through = excluded.dormant_through,
           explanation_id = excluded.explanation_id,
           signature = excluded.signature,
           updated_at = excluded.updated_at",
        params![
            instance.patient_id.to_string(),
            instance.base_name,
            instance.variant_id.map(|id| id.to_string()),
            instance.status.as_str(),
            instance.last_completed_date.map(|d| d.to_string()),
            instance.next_due_date.map(|d| d.to_string()),
            instance.dormant_through.map(|d| d.to_string()),
            instance.explanation_id.map(|id| id.to_string()),
            signature,
            instance.updated_at.to_string(),
        ],
    )?;

    tx.execute(
        "DELETE FROM instance_documents WHERE patient_id = ?1 AND base_name = ?2",
        params![instance.patient_id.to_string(), instance.base_name],
    )?;
    for doc_id in &instance.matched_documents {
        tx.execute(
            "INSERT INTO instance_documents (patient_id, base_name, document_id)
             VALUES (?1, ?2, ?3)",
            params![
                instance.patient_id.to_string(),
                instance.base_name,
                doc_id.to_string()
            ],
        )?;
    }
    Ok(())
}

/// Mark an instance dormant through a date (appointment flow). The
/// dormancy clock decides when it re-enters evaluation.
pub fn set_dormant(
    conn: &Connection,
    patient_id: &Uuid,
    base_name: &str,
    through: NaiveDate,
) -> Result<(), DatabaseError> {
    let rows = conn.execute(
        "UPDATE screening_instances SET dormant_through = ?3, status = ?4
         WHERE patient_id = ?1 AND base_name = ?2",
        params![
            patient_id.to_string(),
            base_name,
            through.to_string(),
            ScreeningStatus::Dormant.as_str(),
        ],
    )?;
    if rows == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "ScreeningInstance".into(),
            id: format!("{patient_id}/{base_name}"),
        });
    }
    Ok(())
}

/// All instances for one patient, ordered by base name.
pub fn instances_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<ScreeningInstance>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT patient_id, base_name, variant_id, status, last_completed_date,
         next_due_date, dormant_through, explanation_id, updated_at
         FROM screening_instances WHERE patient_id = ?1 ORDER BY base_name",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok(InstanceRow {
            patient_id: row.get(0)?,
            base_name: row.get(1)?,
            variant_id: row.get(2)?,
            status: row.get(3)?,
            last_completed_date: row.get(4)?,
            next_due_date: row.get(5)?,
            dormant_through: row.get(6)?,
            explanation_id: row.get(7)?,
            updated_at: row.get(8)?,
        })
    })?;

    let mut instances = Vec::new();
    for row in rows {
        let row = row?;
        let matched = matched_documents(conn, patient_id, &row.base_name)?;
        instances.push(instance_from_row(row, matched)?);
    }
    Ok(instances)
}

fn matched_documents(
    conn: &Connection,
    patient_id: &Uuid,
    base_name: &str,
) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT document_id FROM instance_documents
         WHERE patient_id = ?1 AND base_name = ?2 ORDER BY document_id",
    )?;
    let rows = stmt.query_map(params![patient_id.to_string(), base_name], |row| {
        row.get::<_, String>(0)
    })?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_uuid(&row?)?);
    }
    Ok(ids)
}

struct InstanceRow {
    patient_id: String,
    base_name: String,
    variant_id: Option<String>,
    status: String,
    last_completed_date: Option<String>,
    next_due_date: Option<String>,
    dormant_through: Option<String>,
    explanation_id: Option<String>,
    updated_at: String,
}

fn instance_from_row(
    row: InstanceRow,
    matched_documents: Vec<Uuid>,
) -> Result<ScreeningInstance, DatabaseError> {
    Ok(ScreeningInstance {
        patient_id: parse_uuid(&row.patient_id)?,
        base_name: row.base_name,
        variant_id: row.variant_id.as_deref().map(parse_uuid).transpose()?,
        status: ScreeningStatus::from_str(&row.status)?,
        last_completed_date: row.last_completed_date.as_deref().map(parse_date).transpose()?,
        next_due_date: row.next_due_date.as_deref().map(parse_date).transpose()?,
        dormant_through: row.dormant_through.as_deref().map(parse_date).transpose()?,
        matched_documents,
        explanation_id: row.explanation_id.as_deref().map(parse_uuid).transpose()?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

fn parse_date(raw: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

fn parse_datetime(raw: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
