use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::DocumentType;
use crate::models::Document;

use super::organization::parse_uuid;

pub fn insert_document(conn: &Connection, doc: &Document) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO documents (id, patient_id, type, service_date, text, ingested_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            doc.id.to_string(),
            doc.patient_id.to_string(),
            doc.doc_type.as_str(),
            doc.service_date.to_string(),
            doc.text,
            doc.ingested_at.to_string(),
        ],
    )?;
    Ok(())
}

/// All documents for one patient, newest service date first.
pub fn documents_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<Document>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, type, service_date, text, ingested_at
         FROM documents WHERE patient_id = ?1 ORDER BY service_date DESC, id",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    })?;

    let mut docs = Vec::new();
    for row in rows {
        let (raw_id, raw_patient, raw_type, raw_date, text, raw_ingested) = row?;
        docs.push(Document {
            id: parse_uuid(&raw_id)?,
            patient_id: parse_uuid(&raw_patient)?,
            doc_type: DocumentType::from_str(&raw_type)?,
            service_date: parse_date(&raw_date)?,
            text,
            ingested_at: parse_datetime(&raw_ingested)?,
        });
    }
    Ok(docs)
}

/// Ids of documents whose patient is absent from the current snapshot.
/// These are skipped for the run and surfaced in the batch log.
pub fn orphan_document_ids(conn: &Connection) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT d.id FROM documents d
         LEFT JOIN patients p ON p.id = d.patient_id
         WHERE p.id IS NULL ORDER BY d.id",
    )?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_uuid(&row?)?);
    }
    Ok(ids)
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
