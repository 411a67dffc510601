use chrono::{DateTime, Utc};
use relayscope_types::AuditEntry;
use rusqlite::{params, Connection};

use crate::Result;

pub fn append(conn: &Connection, entry: &AuditEntry) -> Result<()> {
    conn.execute(
        "INSERT INTO audit_log (entity_type, entity_id, from_status, to_status, accepted, at, note) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.entity_type,
            entry.entity_id,
            entry.from_status,
            entry.to_status,
            entry.accepted,
            entry.at.to_rfc3339(),
            entry.note,
        ],
    )?;
    Ok(())
}

/// Every recorded transition attempt for one entity, oldest first,
/// accepted and rejected alike, so a rejected transition still shows up in
/// the trail.
pub fn list_for(conn: &Connection, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(
        "SELECT entity_type, entity_id, from_status, to_status, accepted, at, note FROM audit_log \
         WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY id ASC",
    )?;
    let entries = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let at: String = row.get(5)?;
            Ok(AuditEntry {
                entity_type: row.get(0)?,
                entity_id: row.get(1)?,
                from_status: row.get(2)?,
                to_status: row.get(3)?,
                accepted: row.get(4)?,
                at: DateTime::parse_from_rfc3339(&at).map(|t| t.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
                note: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(entries)
}
