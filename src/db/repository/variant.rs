//! Screening-variant persistence and lifecycle transitions.
//!
//! `save_variant` runs definition-time validation, so a contradictory
//! definition never reaches storage, and therefore never evaluation.
//! Variants are archived, never deleted: the explanation log references
//! them for replay.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::{FrequencyUnit, Gender, VariantState};
use crate::models::variant::KeywordSet;
use crate::models::{ConditionCode, Frequency, ScreeningVariant};

use super::organization::parse_uuid;

pub fn save_variant(conn: &mut Connection, variant: &ScreeningVariant) -> Result<(), DatabaseError> {
    variant.validate()?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO screening_variants
         (id, base_name, name, gender, age_min, age_max, frequency_number, frequency_unit,
          keywords, specificity, state, created_at, archived_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            variant.id.to_string(),
            variant.base_name,
            variant.name,
            variant.gender.map(|g| g.as_str()),
            variant.age_min,
            variant.age_max,
            variant.frequency.number,
            variant.frequency.unit.as_str(),
            serde_json::to_string(&variant.keywords)?,
            variant.specificity(),
            variant.state.as_str(),
            variant.created_at.to_string(),
            variant.archived_at.map(|t| t.to_string()),
        ],
    )?;
    for code in &variant.trigger_conditions {
        tx.execute(
            "INSERT INTO variant_trigger_conditions (variant_id, code) VALUES (?1, ?2)",
            params![variant.id.to_string(), code.as_str()],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Move a variant through the lifecycle state machine. Invalid
/// transitions (e.g. un-archiving) are rejected.
pub fn transition_variant(
    conn: &Connection,
    id: &Uuid,
    next: VariantState,
) -> Result<(), DatabaseError> {
    let current = get_variant(conn, id)?.state;
    if !current.can_transition_to(next) {
        return Err(DatabaseError::ConstraintViolation(format!(
            "invalid lifecycle transition: {} -> {}",
            current.as_str(),
            next.as_str()
        )));
    }

    let archived_at = match next {
        VariantState::Archived => Some(Utc::now().naive_utc().to_string()),
        _ => None,
    };
    conn.execute(
        "UPDATE screening_variants SET state = ?2, archived_at = ?3 WHERE id = ?1",
        params![id.to_string(), next.as_str(), archived_at],
    )?;
    Ok(())
}

pub fn get_variant(conn: &Connection, id: &Uuid) -> Result<ScreeningVariant, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, base_name, name, gender, age_min, age_max, frequency_number,
         frequency_unit, keywords, state, created_at, archived_at
         FROM screening_variants WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id.to_string()], map_row);
    match result {
        Ok(row) => variant_from_row(conn, row),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NotFound {
            entity_type: "ScreeningVariant".into(),
            id: id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// The Active, non-archived definition set — what a batch run snapshots
/// at start. Ordered by (base_name, id) so snapshot contents are stable.
pub fn list_active_variants(conn: &Connection) -> Result<Vec<ScreeningVariant>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, base_name, name, gender, age_min, age_max, frequency_number,
         frequency_unit, keywords, state, created_at, archived_at
         FROM screening_variants WHERE state = 'active' ORDER BY base_name, id",
    )?;

    let rows = stmt.query_map([], map_row)?;
    let mut variants = Vec::new();
    for row in rows {
        variants.push(variant_from_row(conn, row?)?);
    }
    Ok(variants)
}

struct VariantRow {
    id: String,
    base_name: String,
    name: String,
    gender: Option<String>,
    age_min: Option<u32>,
    age_max: Option<u32>,
    frequency_number: f64,
    frequency_unit: String,
    keywords: String,
    state: String,
    created_at: String,
    archived_at: Option<String>,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<VariantRow> {
    Ok(VariantRow {
        id: row.get(0)?,
        base_name: row.get(1)?,
        name: row.get(2)?,
        gender: row.get(3)?,
        age_min: row.get(4)?,
        age_max: row.get(5)?,
        frequency_number: row.get(6)?,
        frequency_unit: row.get(7)?,
        keywords: row.get(8)?,
        state: row.get(9)?,
        created_at: row.get(10)?,
        archived_at: row.get(11)?,
    })
}

fn variant_from_row(conn: &Connection, row: VariantRow) -> Result<ScreeningVariant, DatabaseError> {
    let id = parse_uuid(&row.id)?;
    Ok(ScreeningVariant {
        id,
        base_name: row.base_name,
        name: row.name,
        gender: row.gender.as_deref().map(Gender::from_str).transpose()?,
        age_min: row.age_min,
        age_max: row.age_max,
        trigger_conditions: load_triggers(conn, &id)?,
        frequency: Frequency::new(
            row.frequency_number,
            FrequencyUnit::from_str(&row.frequency_unit)?,
        ),
        keywords: serde_json::from_str::<KeywordSet>(&row.keywords)?,
        state: VariantState::from_str(&row.state)?,
        created_at: parse_datetime(&row.created_at)?,
        archived_at: row.archived_at.as_deref().map(parse_datetime).transpose()?,
    })
}

fn load_triggers(
    conn: &Connection,
    variant_id: &Uuid,
) -> Result<BTreeSet<ConditionCode>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT code FROM variant_trigger_conditions WHERE variant_id = ?1")?;
    let rows = stmt.query_map(params![variant_id.to_string()], |row| {
        row.get::<_, String>(0)
    })?;

    let mut triggers = BTreeSet::new();
    for row in rows {
        let code = row?;
        triggers.insert(
            ConditionCode::new(&code)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        );
    }
    Ok(triggers)
}

fn parse_datetime(raw: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
