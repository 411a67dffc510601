use chrono::{DateTime, Utc};
use relayscope_types::{AuditEntry, Recommendation, RecommendationStatus};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{queries::audit_log, Error, Result};

pub fn create(conn: &Connection, recommendation: &Recommendation) -> Result<()> {
    conn.execute(
        "INSERT INTO recommendations (recommendation_id, finding_id, title, description, status, \
         created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            recommendation.recommendation_id,
            recommendation.finding_id,
            recommendation.title,
            recommendation.description,
            status_to_str(recommendation.status),
            recommendation.created_at.to_rfc3339(),
            recommendation.updated_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, recommendation_id: &str) -> Result<Option<Recommendation>> {
    conn.query_row(
        "SELECT recommendation_id, finding_id, title, description, status, created_at, updated_at \
         FROM recommendations WHERE recommendation_id = ?1",
        params![recommendation_id],
        |row| {
            let created_at: String = row.get(5)?;
            let updated_at: String = row.get(6)?;
            let status: String = row.get(4)?;
            Ok(Recommendation {
                recommendation_id: row.get(0)?,
                finding_id: row.get(1)?,
                title: row.get(2)?,
                description: row.get(3)?,
                status: str_to_status(&status),
                created_at: parse_ts(created_at),
                updated_at: parse_ts(updated_at),
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

pub fn list_for(conn: &Connection, finding_id: &str) -> Result<Vec<Recommendation>> {
    let mut stmt = conn.prepare(
        "SELECT recommendation_id FROM recommendations WHERE finding_id = ?1 ORDER BY created_at ASC",
    )?;
    let ids: Vec<String> = stmt
        .query_map(params![finding_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    ids.into_iter().filter_map(|id| get(conn, &id).transpose()).collect()
}

/// Attempts `recommendation.status -> to`, appending the outcome to the
/// audit log regardless of whether it was legal. Rejects illegal
/// transitions with [`Error::IllegalTransition`] rather than silently
/// clamping to the nearest legal state.
pub fn transition(conn: &Connection, recommendation_id: &str, to: RecommendationStatus, note: Option<&str>, now: DateTime<Utc>) -> Result<Recommendation> {
    let mut recommendation = get(conn, recommendation_id)?.ok_or_else(|| Error::NotFound(recommendation_id.to_string()))?;
    let from = recommendation.status;
    let legal = from.can_transition_to(to);

    audit_log::append(
        conn,
        &AuditEntry {
            entity_type: "recommendation".to_string(),
            entity_id: recommendation_id.to_string(),
            from_status: status_to_str(from).to_string(),
            to_status: status_to_str(to).to_string(),
            accepted: legal,
            at: now,
            note: note.map(str::to_string),
        },
    )?;

    if !legal {
        return Err(Error::IllegalTransition {
            from: status_to_str(from).to_string(),
            to: status_to_str(to).to_string(),
        });
    }

    recommendation.status = to;
    recommendation.updated_at = now;
    conn.execute(
        "UPDATE recommendations SET status = ?1, updated_at = ?2 WHERE recommendation_id = ?3",
        params![status_to_str(to), now.to_rfc3339(), recommendation_id],
    )?;
    Ok(recommendation)
}

fn status_to_str(status: RecommendationStatus) -> &'static str {
    use RecommendationStatus::*;
    match status {
        Pending => "pending",
        Fixing => "fixing",
        Fixed => "fixed",
        Verified => "verified",
        Dismissed => "dismissed",
        Ignored => "ignored",
    }
}

fn str_to_status(s: &str) -> RecommendationStatus {
    use RecommendationStatus::*;
    match s {
        "fixing" => Fixing,
        "fixed" => Fixed,
        "verified" => Verified,
        "dismissed" => Dismissed,
        "ignored" => Ignored,
        _ => Pending,
    }
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::init_schema;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO agents (system_prompt_id, created_at, updated_at) VALUES ('sp1', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO analysis_sessions (id, system_prompt_id, kind, status, started_at) \
             VALUES ('a1', 'sp1', 'dynamic', 'in_progress', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO sessions (session_id, created_at, last_activity, is_active, is_completed) \
             VALUES ('s1', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z', 0, 1)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO findings (finding_id, analysis_session_id, session_id, finding_type, severity, \
             title, description, status, fingerprint, created_at, updated_at) \
             VALUES ('f1', 'a1', 's1', 'sql_injection', 'high', 't', 'd', 'open', 'fp1', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z')",
            [],
        )
        .unwrap();
        conn
    }

    fn sample(now: DateTime<Utc>) -> Recommendation {
        Recommendation {
            recommendation_id: "r1".into(),
            finding_id: "f1".into(),
            title: "Parameterize query".into(),
            description: "Use bound parameters".into(),
            status: RecommendationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn legal_transition_updates_status_and_logs() {
        let conn = setup();
        let now = Utc::now();
        create(&conn, &sample(now)).unwrap();

        let updated = transition(&conn, "r1", RecommendationStatus::Fixing, None, now).unwrap();
        assert_eq!(updated.status, RecommendationStatus::Fixing);

        let log = audit_log::list_for(&conn, "recommendation", "r1").unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].accepted);
    }

    #[test]
    fn illegal_transition_is_rejected_but_still_logged() {
        let conn = setup();
        let now = Utc::now();
        create(&conn, &sample(now)).unwrap();

        let err = transition(&conn, "r1", RecommendationStatus::Verified, None, now).unwrap_err();
        assert!(matches!(err, Error::IllegalTransition { .. }));

        let unchanged = get(&conn, "r1").unwrap().unwrap();
        assert_eq!(unchanged.status, RecommendationStatus::Pending);

        let log = audit_log::list_for(&conn, "recommendation", "r1").unwrap();
        assert_eq!(log.len(), 1);
        assert!(!log[0].accepted);
    }
}
