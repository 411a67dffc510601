use rusqlite::Connection;

use crate::Result;

// Schema version (increment when changing table definitions; any mismatch
// drops and recreates every table below rather than migrating in place).
pub const SCHEMA_VERSION: i32 = 1;

// NOTE: Database Design Rationale
//
// Why drop-and-recreate instead of incremental migrations?
// - Sessions and agents are fully reconstructible from proxy traffic; there
//   is no durable customer data here that a migration would need to carry
//   forward, so a version bump can simply start over.
// - Keeps this module a single source of truth for the schema instead of
//   an accumulating stack of ALTER TABLE statements.
//
// Why JSON columns for events/tool sets instead of normalized tables?
// - A session's event ring buffer and tool-usage maps are always read and
//   written as a whole (never queried by individual event), so normalizing
//   them would add join cost with no query benefit.
//
// Why a BLOB column for behavioral_signature?
// - The Jaccard similarity computation in relayscope-engine walks all 512
//   coordinates; storing them as 512 * 8 contiguous bytes avoids a JSON
//   parse on every comparison.

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;

    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if current_version != SCHEMA_VERSION {
        drop_all_tables(conn)?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS agents (
            system_prompt_id TEXT PRIMARY KEY,
            agent_id TEXT,
            display_name TEXT,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            session_ids TEXT NOT NULL DEFAULT '[]',
            completed_session_count INTEGER NOT NULL DEFAULT 0,
            tools_ever_seen TEXT NOT NULL DEFAULT '[]',
            tools_ever_used TEXT NOT NULL DEFAULT '[]',
            frozen_percentiles TEXT,
            last_analyzed_session_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS sessions (
            session_id TEXT PRIMARY KEY,
            system_prompt_id TEXT REFERENCES agents(system_prompt_id),
            agent_id TEXT,
            created_at TEXT NOT NULL,
            last_activity TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            is_completed INTEGER NOT NULL,
            events_count INTEGER NOT NULL DEFAULT 0,
            messages_count INTEGER NOT NULL DEFAULT 0,
            tool_uses INTEGER NOT NULL DEFAULT 0,
            errors INTEGER NOT NULL DEFAULT 0,
            tokens_input INTEGER NOT NULL DEFAULT 0,
            tokens_output INTEGER NOT NULL DEFAULT 0,
            cumulative_response_ms INTEGER NOT NULL DEFAULT 0,
            tool_usage_details TEXT NOT NULL DEFAULT '{}',
            available_tools TEXT NOT NULL DEFAULT '[]',
            events TEXT NOT NULL DEFAULT '[]',
            behavioral_signature BLOB,
            behavioral_features TEXT,
            last_analysis_session_id TEXT
        );

        CREATE TABLE IF NOT EXISTS analysis_sessions (
            id TEXT PRIMARY KEY,
            system_prompt_id TEXT NOT NULL REFERENCES agents(system_prompt_id),
            kind TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT NOT NULL,
            completed_at TEXT,
            sessions_analyzed TEXT NOT NULL DEFAULT '[]',
            findings_count INTEGER NOT NULL DEFAULT 0,
            risk_score REAL
        );

        CREATE TABLE IF NOT EXISTS findings (
            finding_id TEXT PRIMARY KEY,
            analysis_session_id TEXT NOT NULL REFERENCES analysis_sessions(id),
            session_id TEXT NOT NULL REFERENCES sessions(session_id),
            agent_id TEXT,
            file_path TEXT,
            line_start INTEGER,
            line_end INTEGER,
            finding_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            evidence TEXT NOT NULL DEFAULT '{}',
            owasp TEXT NOT NULL DEFAULT '[]',
            cwe TEXT NOT NULL DEFAULT '[]',
            mitre TEXT NOT NULL DEFAULT '[]',
            status TEXT NOT NULL,
            fingerprint TEXT NOT NULL UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS security_checks (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            analysis_session_id TEXT NOT NULL REFERENCES analysis_sessions(id),
            category TEXT NOT NULL,
            check_id TEXT NOT NULL,
            status TEXT NOT NULL,
            value TEXT NOT NULL,
            evidence TEXT NOT NULL DEFAULT '{}',
            recommendations TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS behavioral_analysis (
            analysis_session_id TEXT PRIMARY KEY REFERENCES analysis_sessions(id),
            total_sessions INTEGER NOT NULL,
            num_clusters INTEGER NOT NULL,
            num_outliers INTEGER NOT NULL,
            stability_score REAL NOT NULL,
            predictability_score REAL NOT NULL,
            cluster_diversity REAL NOT NULL,
            confidence TEXT NOT NULL,
            interpretation TEXT NOT NULL,
            clusters TEXT NOT NULL DEFAULT '[]',
            outliers TEXT NOT NULL DEFAULT '[]',
            centroid_distances TEXT NOT NULL DEFAULT '[]'
        );

        CREATE TABLE IF NOT EXISTS recommendations (
            recommendation_id TEXT PRIMARY KEY,
            finding_id TEXT NOT NULL REFERENCES findings(finding_id),
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            from_status TEXT NOT NULL,
            to_status TEXT NOT NULL,
            accepted INTEGER NOT NULL,
            at TEXT NOT NULL,
            note TEXT
        );

        CREATE TABLE IF NOT EXISTS ide_connections (
            connection_id TEXT PRIMARY KEY,
            session_id TEXT,
            ide_name TEXT NOT NULL,
            connected_at TEXT NOT NULL,
            last_seen_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions_signature_index (
            signature TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sessions_agent ON sessions(system_prompt_id);
        CREATE INDEX IF NOT EXISTS idx_sessions_active ON sessions(is_active, is_completed, last_activity);
        CREATE INDEX IF NOT EXISTS idx_sessions_unanalyzed ON sessions(last_analysis_session_id);
        CREATE INDEX IF NOT EXISTS idx_findings_session ON findings(session_id);
        CREATE INDEX IF NOT EXISTS idx_findings_analysis ON findings(analysis_session_id);
        CREATE INDEX IF NOT EXISTS idx_recommendations_finding ON recommendations(finding_id);
        CREATE INDEX IF NOT EXISTS idx_audit_log_entity ON audit_log(entity_type, entity_id);
        CREATE INDEX IF NOT EXISTS idx_security_checks_analysis ON security_checks(analysis_session_id);
        "#,
    )?;

    conn.execute(&format!("PRAGMA user_version = {SCHEMA_VERSION}"), [])?;
    Ok(())
}

fn drop_all_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS sessions_signature_index;
        DROP TABLE IF EXISTS ide_connections;
        DROP TABLE IF EXISTS audit_log;
        DROP TABLE IF EXISTS recommendations;
        DROP TABLE IF EXISTS behavioral_analysis;
        DROP TABLE IF EXISTS security_checks;
        DROP TABLE IF EXISTS findings;
        DROP TABLE IF EXISTS analysis_sessions;
        DROP TABLE IF EXISTS sessions;
        DROP TABLE IF EXISTS agents;
        "#,
    )?;
    Ok(())
}
