use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::enums::Gender;
use crate::models::{ConditionCode, Patient};

use super::organization::parse_uuid;

/// Insert a patient with their coded condition set, atomically.
pub fn insert_patient(conn: &mut Connection, patient: &Patient) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO patients (id, organization_id, emr_reference, birth_date, gender)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            patient.id.to_string(),
            patient.organization_id.to_string(),
            patient.emr_reference,
            patient.birth_date.to_string(),
            patient.gender.as_str(),
        ],
    )?;
    for code in &patient.conditions {
        tx.execute(
            "INSERT INTO patient_conditions (patient_id, code) VALUES (?1, ?2)",
            params![patient.id.to_string(), code.as_str()],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Replace a patient's condition set (EMR sync path).
pub fn replace_conditions(
    conn: &mut Connection,
    patient_id: &Uuid,
    conditions: &BTreeSet<ConditionCode>,
) -> Result<(), DatabaseError> {
    let tx = conn.transaction()?;
    tx.execute(
        "DELETE FROM patient_conditions WHERE patient_id = ?1",
        params![patient_id.to_string()],
    )?;
    for code in conditions {
        tx.execute(
            "INSERT INTO patient_conditions (patient_id, code) VALUES (?1, ?2)",
            params![patient_id.to_string(), code.as_str()],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn get_patient(conn: &Connection, id: &Uuid) -> Result<Patient, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, organization_id, emr_reference, birth_date, gender
         FROM patients WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        },
    );

    let (raw_id, raw_org, emr_reference, raw_birth, raw_gender) = match result {
        Ok(row) => row,
        Err(rusqlite::Error::QueryReturnedNoRows) => {
            return Err(DatabaseError::NotFound {
                entity_type: "Patient".into(),
                id: id.to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let birth_date = NaiveDate::parse_from_str(&raw_birth, "%Y-%m-%d")
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    Ok(Patient {
        id: parse_uuid(&raw_id)?,
        organization_id: parse_uuid(&raw_org)?,
        emr_reference,
        birth_date,
        gender: Gender::from_str(&raw_gender)?,
        conditions: load_conditions(conn, id)?,
    })
}

fn load_conditions(
    conn: &Connection,
    patient_id: &Uuid,
) -> Result<BTreeSet<ConditionCode>, DatabaseError> {
    let mut stmt =
        conn.prepare("SELECT code FROM patient_conditions WHERE patient_id = ?1")?;
    let rows = stmt.query_map(params![patient_id.to_string()], |row| {
        row.get::<_, String>(0)
    })?;

    let mut conditions = BTreeSet::new();
    for row in rows {
        let code = row?;
        conditions.insert(
            ConditionCode::new(&code)
                .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?,
        );
    }
    Ok(conditions)
}

/// All patient ids, in stable id order.
pub fn list_patient_ids(conn: &Connection) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT id FROM patients ORDER BY id")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_uuid(&row?)?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_memory_database;
    use crate::db::repository::organization::insert_organization;
    use crate::models::Organization;

    fn seed_org(conn: &Connection) -> Uuid {
        let org = Organization {
            id: Uuid::new_v4(),
            name: "Clinic".into(),
            timezone: "America/New_York".into(),
            lab_currency_months: 12,
            vitals_currency_months: 12,
        };
        insert_organization(conn, &org).unwrap();
        org.id
    }

    #[test]
    fn patient_round_trip_with_conditions() {
        let mut conn = open_memory_database().unwrap();
        let org_id = seed_org(&conn);
        let patient = Patient {
            id: Uuid::new_v4(),
            organization_id: org_id,
            emr_reference: Some("EMR-123".into()),
            birth_date: NaiveDate::from_ymd_opt(1972, 6, 15).unwrap(),
            gender: Gender::Female,
            conditions: ["BRCA1", "E11"]
                .iter()
                .map(|c| ConditionCode::new(c).unwrap())
                .collect(),
        };
        insert_patient(&mut conn, &patient).unwrap();

        let loaded = get_patient(&conn, &patient.id).unwrap();
        assert_eq!(loaded.gender, Gender::Female);
        assert_eq!(loaded.conditions.len(), 2);
        assert!(loaded.conditions.contains(&ConditionCode::new("BRCA1").unwrap()));
    }

    #[test]
    fn replace_conditions_overwrites() {
        let mut conn = open_memory_database().unwrap();
        let org_id = seed_org(&conn);
        let patient = Patient {
            id: Uuid::new_v4(),
            organization_id: org_id,
            emr_reference: None,
            birth_date: NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(),
            gender: Gender::Male,
            conditions: [ConditionCode::new("I10").unwrap()].into_iter().collect(),
        };
        insert_patient(&mut conn, &patient).unwrap();

        let next: BTreeSet<ConditionCode> =
            [ConditionCode::new("E11").unwrap()].into_iter().collect();
        replace_conditions(&mut conn, &patient.id, &next).unwrap();

        let loaded = get_patient(&conn, &patient.id).unwrap();
        assert_eq!(loaded.conditions, next);
    }

    #[test]
    fn patient_ids_listed_in_stable_order() {
        let mut conn = open_memory_database().unwrap();
        let org_id = seed_org(&conn);
        for _ in 0..3 {
            let patient = Patient {
                id: Uuid::new_v4(),
                organization_id: org_id,
                emr_reference: None,
                birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                gender: Gender::Unknown,
                conditions: BTreeSet::new(),
            };
            insert_patient(&mut conn, &patient).unwrap();
        }
        let ids = list_patient_ids(&conn).unwrap();
        assert_eq!(ids.len(), 3);
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
