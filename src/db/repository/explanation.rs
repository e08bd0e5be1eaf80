//! Append-only explanation log. Insert and read only — no update or
//! delete path exists, by design of the audit contract.

use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Transaction};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{ExplanationPayload, MatchExplanation};

use super::organization::parse_uuid;

pub fn insert_explanation(
    conn: &Connection,
    explanation: &MatchExplanation,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO match_explanations (id, patient_id, base_name, run_id, recorded_at, payload)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            explanation.id.to_string(),
            explanation.patient_id.to_string(),
            explanation.base_name,
            explanation.run_id.to_string(),
            explanation.recorded_at.to_string(),
            serde_json::to_string(&explanation.payload)?,
        ],
    )?;
    Ok(())
}

/// Transaction-scoped insert used by the instance writer.
pub(crate) fn insert_explanation_tx(
    tx: &Transaction<'_>,
    explanation: &MatchExplanation,
) -> Result<(), DatabaseError> {
    insert_explanation(tx, explanation)
}

pub fn get_explanation(conn: &Connection, id: &Uuid) -> Result<MatchExplanation, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, patient_id, base_name, run_id, recorded_at, payload
         FROM match_explanations WHERE id = ?1",
        params![id.to_string()],
        map_row,
    );

    match result {
        Ok(row) => explanation_from_row(row),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NotFound {
            entity_type: "MatchExplanation".into(),
            id: id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Full decision history for one patient, oldest first — the replay
/// order an audit walks through.
pub fn explanations_for_patient(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<Vec<MatchExplanation>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, base_name, run_id, recorded_at, payload
         FROM match_explanations WHERE patient_id = ?1
         ORDER BY recorded_at, base_name",
    )?;

    let rows = stmt.query_map(params![patient_id.to_string()], map_row)?;
    let mut explanations = Vec::new();
    for row in rows {
        explanations.push(explanation_from_row(row?)?);
    }
    Ok(explanations)
}

struct ExplanationRow {
    id: String,
    patient_id: String,
    base_name: String,
    run_id: String,
    recorded_at: String,
    payload: String,
}

fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ExplanationRow> {
    Ok(ExplanationRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        base_name: row.get(2)?,
        run_id: row.get(3)?,
        recorded_at: row.get(4)?,
        payload: row.get(5)?,
    })
}

fn explanation_from_row(row: ExplanationRow) -> Result<MatchExplanation, DatabaseError> {
    Ok(MatchExplanation {
        id: parse_uuid(&row.id)?,
        patient_id: parse_uuid(&row.patient_id)?,
        base_name: row.base_name,
        run_id: parse_uuid(&row.run_id)?,
        recorded_at: parse_datetime(&row.recorded_at)?,
        payload: serde_json::from_str::<ExplanationPayload>(&row.payload)?,
    })
}

fn parse_datetime(raw: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::models::ResolutionOutcome;
    use chrono::NaiveDate;

    fn explanation(patient_id: Uuid, base_name: &str, day: u32) -> MatchExplanation {
        MatchExplanation {
            id: Uuid::new_v4(),
            patient_id,
            base_name: base_name.into(),
            run_id: Uuid::new_v4(),
            recorded_at: NaiveDate::from_ymd_opt(2024, 7, day)
                .unwrap()
                .and_hms_opt(3, 0, 0)
                .unwrap(),
            payload: ExplanationPayload {
                resolution: ResolutionOutcome { selected: None, candidates: vec![] },
                document_scores: vec![],
                derivation: None,
            },
        }
    }

    #[test]
    fn insert_and_read_back() {
        let conn = open_memory_database().unwrap();
        let patient_id = Uuid::new_v4();
        let e = explanation(patient_id, "Mammogram", 1);
        insert_explanation(&conn, &e).unwrap();

        let loaded = get_explanation(&conn, &e.id).unwrap();
        assert_eq!(loaded.base_name, "Mammogram");
        assert_eq!(loaded.run_id, e.run_id);
    }

    #[test]
    fn patient_history_in_replay_order() {
        let conn = open_memory_database().unwrap();
        let patient_id = Uuid::new_v4();
        insert_explanation(&conn, &explanation(patient_id, "Mammogram", 15)).unwrap();
        insert_explanation(&conn, &explanation(patient_id, "Colonoscopy", 1)).unwrap();
        insert_explanation(&conn, &explanation(Uuid::new_v4(), "Mammogram", 2)).unwrap();

        let history = explanations_for_patient(&conn, &patient_id).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].base_name, "Colonoscopy");
        assert_eq!(history[1].base_name, "Mammogram");
    }

    #[test]
    fn duplicate_id_rejected() {
        let conn = open_memory_database().unwrap();
        let e = explanation(Uuid::new_v4(), "Mammogram", 1);
        insert_explanation(&conn, &e).unwrap();
        assert!(insert_explanation(&conn, &e).is_err());
    }
}
