use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::Organization;

pub fn insert_organization(conn: &Connection, org: &Organization) -> Result<(), DatabaseError> {
    // Timezone validated before the row exists, so evaluation can trust it.
    org.tz()?;
    conn.execute(
        "INSERT INTO organizations (id, name, timezone, lab_currency_months, vitals_currency_months)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            org.id.to_string(),
            org.name,
            org.timezone,
            org.lab_currency_months,
            org.vitals_currency_months,
        ],
    )?;
    Ok(())
}

pub fn get_organization(conn: &Connection, id: &Uuid) -> Result<Organization, DatabaseError> {
    let result = conn.query_row(
        "SELECT id, name, timezone, lab_currency_months, vitals_currency_months
         FROM organizations WHERE id = ?1",
        params![id.to_string()],
        |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, u32>(3)?,
                row.get::<_, u32>(4)?,
            ))
        },
    );

    match result {
        Ok((raw_id, name, timezone, lab, vitals)) => Ok(Organization {
            id: parse_uuid(&raw_id)?,
            name,
            timezone,
            lab_currency_months: lab,
            vitals_currency_months: vitals,
        }),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(DatabaseError::NotFound {
            entity_type: "Organization".into(),
            id: id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
