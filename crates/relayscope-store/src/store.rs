use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use relayscope_types::{
    Agent, AssessmentCheck, BehavioralResult, Event, Finding, FindingStatus, FrozenPercentiles,
    Session, SessionCounters, SessionFeatures,
};
use rusqlite::{params, Connection, OptionalExtension};

use crate::blob::{decode_signature, encode_signature};
use crate::{Error, Result};

/// `cleanup_old_data` never runs more than once per this interval, so a hot
/// path that happens to land on the "every 100th event" trigger never pays
/// for a full table scan.
const MIN_CLEANUP_INTERVAL_SECS: u64 = 60;

/// A single-process, embedded trace store. All reads and writes go through
/// one `Mutex<Connection>`, since relayscope-runtime and relayscope-cli's
/// axum handlers touch this store from multiple threads.
pub struct Store {
    conn: Mutex<Connection>,
    last_cleanup: Mutex<Instant>,
    event_counter: Mutex<u64>,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        crate::schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            last_cleanup: Mutex::new(Instant::now()),
            event_counter: Mutex::new(0),
        })
    }

    // ---- sessions -------------------------------------------------------

    /// Atomic read-modify-write of the session aggregate and the owning
    /// agent aggregate. Reactivates a completed session before applying, so
    /// a frozen signature/features pair never survives past the update that
    /// postdates it. Triggers a rate-limited cleanup pass on every 100th
    /// event processed by this store.
    pub fn add_event(
        &self,
        event: &Event,
        system_prompt_id: Option<&str>,
        max_events: usize,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let mut session = load_session(&conn, &event.session_id)?
            .unwrap_or_else(|| Session::new(event.session_id.clone(), event.timestamp, max_events));
        session.max_events = max_events;
        session.system_prompt_id = system_prompt_id.map(str::to_string).or(session.system_prompt_id);
        session.agent_id = event.agent_id.clone().or(session.agent_id);

        if let relayscope_types::EventName::ToolExecution = event.name {
            if let Some(name) = event.attributes.get("tool_name").and_then(|v| v.as_str()) {
                session.record_tool_use(name);
            }
        }
        session.record_event(event.clone());
        upsert_session(&conn, &session)?;

        if let Some(system_prompt_id) = &session.system_prompt_id {
            touch_agent(&conn, system_prompt_id, event.timestamp, &session)?;
        }
        drop(conn);

        let mut counter = self.event_counter.lock().unwrap();
        *counter += 1;
        if *counter % 100 == 0 {
            drop(counter);
            self.cleanup_old_data(event.timestamp, 24 * 60)?;
        }
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let conn = self.conn.lock().unwrap();
        load_session(&conn, session_id)
    }

    /// Scans for sessions past their inactivity timeout and marks them
    /// completed, without computing features/signature (that is the
    /// caller's job, since it needs the agent's frozen percentiles).
    /// Returns the ids of sessions newly marked completed.
    pub fn check_and_complete_sessions(&self, now: DateTime<Utc>, timeout_seconds: i64) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let cutoff = now - chrono::Duration::seconds(timeout_seconds);
        let mut stmt = conn.prepare(
            "SELECT session_id FROM sessions WHERE is_active = 1 AND is_completed = 0 AND last_activity < ?1",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![cutoff.to_rfc3339()], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for id in &ids {
            conn.execute(
                "UPDATE sessions SET is_active = 0, is_completed = 1 WHERE session_id = ?1",
                params![id],
            )?;
        }
        Ok(ids)
    }

    /// Persists the frozen (features, signature) pair for a just-completed
    /// session and bumps the owning agent's completed-session counter.
    pub fn complete_session(
        &self,
        session_id: &str,
        signature: &[u64],
        features: &SessionFeatures,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let features_json = serde_json::to_string(features)?;
        let signature_bytes = encode_signature(signature);
        conn.execute(
            "UPDATE sessions SET behavioral_signature = ?1, behavioral_features = ?2 WHERE session_id = ?3",
            params![signature_bytes, features_json, session_id],
        )?;
        if let Some(system_prompt_id) = conn
            .query_row(
                "SELECT system_prompt_id FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten()
        {
            conn.execute(
                "UPDATE agents SET completed_session_count = completed_session_count + 1, updated_at = ?1 \
                 WHERE system_prompt_id = ?2",
                params![Utc::now().to_rfc3339(), system_prompt_id],
            )?;
        }
        Ok(())
    }

    /// Deletes only incomplete sessions idle past `retention_minutes`.
    /// Completed sessions are never deleted; their frozen signatures are
    /// permanent. Rate-limited to at most once per
    /// [`MIN_CLEANUP_INTERVAL_SECS`].
    pub fn cleanup_old_data(&self, now: DateTime<Utc>, retention_minutes: i64) -> Result<usize> {
        {
            let mut last = self.last_cleanup.lock().unwrap();
            if last.elapsed().as_secs() < MIN_CLEANUP_INTERVAL_SECS {
                return Ok(0);
            }
            *last = Instant::now();
        }
        let conn = self.conn.lock().unwrap();
        let cutoff = now - chrono::Duration::minutes(retention_minutes);
        let deleted = conn.execute(
            "DELETE FROM sessions WHERE is_completed = 0 AND last_activity < ?1",
            params![cutoff.to_rfc3339()],
        )?;
        Ok(deleted)
    }

    // ---- agents ----------------------------------------------------------

    pub fn get_agent(&self, system_prompt_id: &str) -> Result<Option<Agent>> {
        let conn = self.conn.lock().unwrap();
        load_agent(&conn, system_prompt_id)
    }

    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT system_prompt_id FROM agents ORDER BY updated_at DESC")?;
        let ids: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids.into_iter().filter_map(|id| load_agent(&conn, &id).transpose()).collect()
    }

    /// Most recently active sessions, optionally restricted to one agent.
    /// Backs the dashboard's session list and the CLI's `sessions list`.
    pub fn list_recent_sessions(&self, system_prompt_id: Option<&str>, limit: usize) -> Result<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let ids: Vec<String> = match system_prompt_id {
            Some(system_prompt_id) => {
                let mut stmt = conn.prepare(
                    "SELECT session_id FROM sessions WHERE system_prompt_id = ?1 \
                     ORDER BY last_activity DESC LIMIT ?2",
                )?;
                stmt.query_map(params![system_prompt_id, limit as i64], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt =
                    conn.prepare("SELECT session_id FROM sessions ORDER BY last_activity DESC LIMIT ?1")?;
                stmt.query_map(params![limit as i64], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        ids.into_iter().filter_map(|id| load_session(&conn, &id).transpose()).collect()
    }

    /// Findings across every analysis session, most recent first, optionally
    /// filtered to one status. Backs the dashboard's findings feed and the
    /// CLI's `findings` listing.
    pub fn list_findings(&self, status: Option<FindingStatus>) -> Result<Vec<Finding>> {
        let conn = self.conn.lock().unwrap();
        let ids: Vec<String> = match status {
            Some(status) => {
                let mut stmt = conn.prepare(
                    "SELECT finding_id FROM findings WHERE status = ?1 ORDER BY updated_at DESC",
                )?;
                stmt.query_map(params![finding_status_to_str(status)], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare("SELECT finding_id FROM findings ORDER BY updated_at DESC")?;
                stmt.query_map([], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            }
        };
        ids.into_iter().filter_map(|id| load_finding(&conn, &id).transpose()).collect()
    }

    /// Findings whose `agent_id` matches, most recent first. Backs
    /// `GET /api/workflow/{id}/findings`.
    pub fn list_findings_for_agent(&self, agent_id: &str) -> Result<Vec<Finding>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT finding_id FROM findings WHERE agent_id = ?1 ORDER BY updated_at DESC")?;
        let ids: Vec<String> = stmt
            .query_map(params![agent_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids.into_iter().filter_map(|id| load_finding(&conn, &id).transpose()).collect()
    }

    /// Freezes an agent's distributional percentiles once and only once.
    pub fn freeze_agent_percentiles(&self, system_prompt_id: &str, percentiles: &FrozenPercentiles) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE agents SET frozen_percentiles = ?1, updated_at = ?2 WHERE system_prompt_id = ?3",
            params![serde_json::to_string(percentiles)?, Utc::now().to_rfc3339(), system_prompt_id],
        )?;
        Ok(())
    }

    /// Returns every agent whose completed-session count has advanced past
    /// its last-analyzed watermark, the set the analysis runner's startup
    /// recovery scan and burst re-evaluation both consult.
    pub fn agents_with_unanalyzed_sessions(&self, min_sessions: u64) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT system_prompt_id FROM agents \
             WHERE completed_session_count >= ?1 AND completed_session_count > last_analyzed_session_count",
        )?;
        let ids = stmt
            .query_map(params![min_sessions as i64], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Loads all completed sessions for an agent, already carrying their
    /// frozen (features, signature) pair, as owned data. The lock is
    /// released before this returns, so the caller can take as long as it
    /// likes computing a behavioral result without blocking other writers.
    pub fn snapshot_agent_sessions(&self, system_prompt_id: &str) -> Result<Vec<Session>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT session_id FROM sessions WHERE system_prompt_id = ?1 AND is_completed = 1",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![system_prompt_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids.into_iter().filter_map(|id| load_session(&conn, &id).transpose()).collect()
    }

    pub fn mark_sessions_analyzed(&self, session_ids: &[String], analysis_session_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        for id in session_ids {
            conn.execute(
                "UPDATE sessions SET last_analysis_session_id = ?1 WHERE session_id = ?2",
                params![analysis_session_id, id],
            )?;
        }
        if let Some(system_prompt_id) = conn
            .query_row(
                "SELECT system_prompt_id FROM analysis_sessions WHERE id = ?1",
                params![analysis_session_id],
                |row| row.get::<_, String>(0),
            )
            .optional()?
        {
            conn.execute(
                "UPDATE agents SET last_analyzed_session_count = completed_session_count WHERE system_prompt_id = ?1",
                params![system_prompt_id],
            )?;
        }
        Ok(())
    }

    // ---- analysis sessions -------------------------------------------------

    pub fn create_analysis_session(&self, session: &relayscope_types::AnalysisSession) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO analysis_sessions (id, system_prompt_id, kind, status, started_at, completed_at, \
             sessions_analyzed, findings_count, risk_score) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.id,
                session.system_prompt_id,
                kind_to_str(session.kind),
                status_to_str(session.status),
                session.started_at.to_rfc3339(),
                session.completed_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(&session.sessions_analyzed)?,
                session.findings_count as i64,
                session.risk_score,
            ],
        )?;
        Ok(())
    }

    pub fn get_analysis_session(&self, id: &str) -> Result<Option<relayscope_types::AnalysisSession>> {
        let conn = self.conn.lock().unwrap();
        load_analysis_session(&conn, id)
    }

    /// Every analysis session run for an agent, most recent first, for the
    /// dashboard's `risk_analysis` history view.
    pub fn list_analysis_sessions_for_agent(&self, system_prompt_id: &str) -> Result<Vec<relayscope_types::AnalysisSession>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id FROM analysis_sessions WHERE system_prompt_id = ?1 ORDER BY started_at DESC",
        )?;
        let ids: Vec<String> = stmt
            .query_map(params![system_prompt_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids.into_iter().filter_map(|id| load_analysis_session(&conn, &id).transpose()).collect()
    }

    /// The most recently completed behavioral result for an agent, joining
    /// through its most recent `analysis_sessions` row that has one.
    pub fn latest_behavioral_result(&self, system_prompt_id: &str) -> Result<Option<BehavioralResult>> {
        let conn = self.conn.lock().unwrap();
        let analysis_session_id: Option<String> = conn
            .query_row(
                "SELECT a.id FROM analysis_sessions a JOIN behavioral_analysis b ON b.analysis_session_id = a.id \
                 WHERE a.system_prompt_id = ?1 ORDER BY a.started_at DESC LIMIT 1",
                params![system_prompt_id],
                |row| row.get(0),
            )
            .optional()?;
        analysis_session_id.map(|id| load_behavioral_result(&conn, &id)).transpose().map(Option::flatten)
    }

    pub fn get_behavioral_result(&self, analysis_session_id: &str) -> Result<Option<BehavioralResult>> {
        let conn = self.conn.lock().unwrap();
        load_behavioral_result(&conn, analysis_session_id)
    }

    pub fn list_security_checks_for_analysis(&self, analysis_session_id: &str) -> Result<Vec<AssessmentCheck>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT category, check_id, status, value, evidence, recommendations FROM security_checks \
             WHERE analysis_session_id = ?1 ORDER BY id ASC",
        )?;
        let checks = stmt
            .query_map(params![analysis_session_id], |row| {
                let status: String = row.get(2)?;
                let evidence: String = row.get(4)?;
                let recommendations: String = row.get(5)?;
                Ok(AssessmentCheck {
                    category: row.get(0)?,
                    check_id: row.get(1)?,
                    status: str_to_check_status(&status),
                    value: row.get(3)?,
                    evidence: serde_json::from_str(&evidence).unwrap_or_default(),
                    recommendations: serde_json::from_str(&recommendations).unwrap_or_default(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(checks)
    }

    pub fn complete_analysis_session(&self, session: &relayscope_types::AnalysisSession) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE analysis_sessions SET status = ?1, completed_at = ?2, sessions_analyzed = ?3, \
             findings_count = ?4, risk_score = ?5 WHERE id = ?6",
            params![
                status_to_str(session.status),
                session.completed_at.map(|t| t.to_rfc3339()),
                serde_json::to_string(&session.sessions_analyzed)?,
                session.findings_count as i64,
                session.risk_score,
                session.id,
            ],
        )?;
        Ok(())
    }

    // ---- findings -------------------------------------------------------

    /// Inserts a finding, or, if a finding with the same fingerprint
    /// already exists, refreshes its `updated_at` and returns the existing
    /// row untouched otherwise.
    pub fn create_or_refresh_finding(&self, finding: &Finding) -> Result<Finding> {
        let conn = self.conn.lock().unwrap();
        let existing: Option<Finding> = conn
            .query_row(
                "SELECT finding_id FROM findings WHERE fingerprint = ?1",
                params![finding.fingerprint],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|id| load_finding(&conn, &id).ok().flatten());

        if let Some(mut existing) = existing {
            existing.updated_at = finding.updated_at;
            conn.execute(
                "UPDATE findings SET updated_at = ?1 WHERE finding_id = ?2",
                params![existing.updated_at.to_rfc3339(), existing.finding_id],
            )?;
            return Ok(existing);
        }

        conn.execute(
            "INSERT INTO findings (finding_id, analysis_session_id, session_id, agent_id, file_path, \
             line_start, line_end, finding_type, severity, title, description, evidence, owasp, cwe, mitre, \
             status, fingerprint, created_at, updated_at) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
            params![
                finding.finding_id,
                finding.analysis_session_id,
                finding.session_id,
                finding.agent_id,
                finding.file_path,
                finding.line_start,
                finding.line_end,
                finding.finding_type,
                severity_to_str(finding.severity),
                finding.title,
                finding.description,
                finding.evidence.to_string(),
                serde_json::to_string(&finding.owasp)?,
                serde_json::to_string(&finding.cwe)?,
                serde_json::to_string(&finding.mitre)?,
                finding_status_to_str(finding.status),
                finding.fingerprint,
                finding.created_at.to_rfc3339(),
                finding.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(finding.clone())
    }

    pub fn get_finding(&self, finding_id: &str) -> Result<Option<Finding>> {
        let conn = self.conn.lock().unwrap();
        load_finding(&conn, finding_id)
    }

    /// Applies `Finding::update_status` (append note, bump `updated_at`) and
    /// persists the result. `OPEN -> FIXED | IGNORED` is the only legal
    /// transition shape; there is no path back to `OPEN`.
    pub fn update_finding_status(
        &self,
        finding_id: &str,
        status: FindingStatus,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Finding> {
        let conn = self.conn.lock().unwrap();
        let mut finding = load_finding(&conn, finding_id)?
            .ok_or_else(|| Error::NotFound(format!("finding {finding_id}")))?;
        finding.update_status(status, note, now);
        conn.execute(
            "UPDATE findings SET status = ?1, description = ?2, updated_at = ?3 WHERE finding_id = ?4",
            params![
                finding_status_to_str(finding.status),
                finding.description,
                finding.updated_at.to_rfc3339(),
                finding.finding_id,
            ],
        )?;
        Ok(finding)
    }

    pub fn list_findings_for_analysis(&self, analysis_session_id: &str) -> Result<Vec<Finding>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT finding_id FROM findings WHERE analysis_session_id = ?1")?;
        let ids: Vec<String> = stmt
            .query_map(params![analysis_session_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        ids.into_iter().filter_map(|id| load_finding(&conn, &id).transpose()).collect()
    }

    /// Bulk-inserts a security report's checks, returning the count
    /// inserted.
    pub fn persist_security_checks(&self, checks: &[AssessmentCheck], analysis_session_id: &str) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        for check in checks {
            conn.execute(
                "INSERT INTO security_checks (analysis_session_id, category, check_id, status, value, \
                 evidence, recommendations) VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![
                    analysis_session_id,
                    check.category,
                    check.check_id,
                    check_status_to_str(check.status),
                    check.value,
                    serde_json::to_string(&check.evidence)?,
                    serde_json::to_string(&check.recommendations)?,
                ],
            )?;
        }
        Ok(checks.len())
    }

    pub fn persist_behavioral_result(&self, result: &BehavioralResult, analysis_session_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO behavioral_analysis (analysis_session_id, total_sessions, num_clusters, \
             num_outliers, stability_score, predictability_score, cluster_diversity, confidence, \
             interpretation, clusters, outliers, centroid_distances) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12)",
            params![
                analysis_session_id,
                result.total_sessions as i64,
                result.num_clusters as i64,
                result.num_outliers as i64,
                result.stability_score,
                result.predictability_score,
                result.cluster_diversity,
                confidence_to_str(result.confidence),
                result.interpretation,
                serde_json::to_string(&result.clusters)?,
                serde_json::to_string(&result.outliers)?,
                serde_json::to_string(&result.centroid_distances)?,
            ],
        )?;
        Ok(())
    }

    // ---- ide connections --------------------------------------------------

    pub fn upsert_ide_connection(&self, connection_id: &str, session_id: Option<&str>, ide_name: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO ide_connections (connection_id, session_id, ide_name, connected_at, last_seen_at) \
             VALUES (?1,?2,?3,?4,?4) \
             ON CONFLICT(connection_id) DO UPDATE SET session_id = ?2, last_seen_at = ?4",
            params![connection_id, session_id, ide_name, now.to_rfc3339()],
        )?;
        Ok(())
    }

    // ---- signature index (persisted mirror of the in-memory resolver) -----

    pub fn persist_signature(&self, signature: &str, session_id: &str, now: DateTime<Utc>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sessions_signature_index (signature, session_id, updated_at) VALUES (?1,?2,?3) \
             ON CONFLICT(signature) DO UPDATE SET session_id = ?2, updated_at = ?3",
            params![signature, session_id, now.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn lookup_signature(&self, signature: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        Ok(conn
            .query_row(
                "SELECT session_id FROM sessions_signature_index WHERE signature = ?1",
                params![signature],
                |row| row.get(0),
            )
            .optional()?)
    }

    // ---- recommendations ---------------------------------------------------

    pub fn create_recommendation(&self, recommendation: &relayscope_types::Recommendation) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        crate::queries::recommendation::create(&conn, recommendation)
    }

    pub fn get_recommendation(&self, recommendation_id: &str) -> Result<Option<relayscope_types::Recommendation>> {
        let conn = self.conn.lock().unwrap();
        crate::queries::recommendation::get(&conn, recommendation_id)
    }

    pub fn list_recommendations_for(&self, finding_id: &str) -> Result<Vec<relayscope_types::Recommendation>> {
        let conn = self.conn.lock().unwrap();
        crate::queries::recommendation::list_for(&conn, finding_id)
    }

    pub fn transition_recommendation(
        &self,
        recommendation_id: &str,
        to: relayscope_types::RecommendationStatus,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<relayscope_types::Recommendation> {
        let conn = self.conn.lock().unwrap();
        crate::queries::recommendation::transition(&conn, recommendation_id, to, note, now)
    }

    pub fn audit_log_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<relayscope_types::AuditEntry>> {
        let conn = self.conn.lock().unwrap();
        crate::queries::audit_log::list_for(&conn, entity_type, entity_id)
    }
}

// ---- row <-> struct mapping -------------------------------------------------

fn upsert_session(conn: &Connection, session: &Session) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (session_id, system_prompt_id, agent_id, created_at, last_activity, \
         is_active, is_completed, events_count, messages_count, tool_uses, errors, tokens_input, \
         tokens_output, cumulative_response_ms, tool_usage_details, available_tools, events, \
         behavioral_signature, behavioral_features, last_analysis_session_id) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20) \
         ON CONFLICT(session_id) DO UPDATE SET \
            system_prompt_id = ?2, agent_id = ?3, last_activity = ?5, is_active = ?6, is_completed = ?7, \
            events_count = ?8, messages_count = ?9, tool_uses = ?10, errors = ?11, tokens_input = ?12, \
            tokens_output = ?13, cumulative_response_ms = ?14, tool_usage_details = ?15, \
            available_tools = ?16, events = ?17, behavioral_signature = ?18, behavioral_features = ?19, \
            last_analysis_session_id = ?20",
        params![
            session.session_id,
            session.system_prompt_id,
            session.agent_id,
            session.created_at.to_rfc3339(),
            session.last_activity.to_rfc3339(),
            session.is_active,
            session.is_completed,
            session.counters.events as i64,
            session.counters.messages as i64,
            session.counters.tool_uses as i64,
            session.counters.errors as i64,
            session.counters.tokens_input as i64,
            session.counters.tokens_output as i64,
            session.counters.cumulative_response_ms as i64,
            serde_json::to_string(&session.tool_usage)?,
            serde_json::to_string(&session.available_tools)?,
            serde_json::to_string(&session.events.iter().collect::<Vec<_>>())?,
            session.signature.as_ref().map(|s| encode_signature(s)),
            session.features.as_ref().map(serde_json::to_string).transpose()?,
            session.last_analysis_session_id,
        ],
    )?;
    Ok(())
}

fn load_session(conn: &Connection, session_id: &str) -> Result<Option<Session>> {
    conn.query_row(
        "SELECT session_id, system_prompt_id, agent_id, created_at, last_activity, is_active, \
         is_completed, events_count, messages_count, tool_uses, errors, tokens_input, tokens_output, \
         cumulative_response_ms, tool_usage_details, available_tools, events, behavioral_signature, \
         behavioral_features, last_analysis_session_id FROM sessions WHERE session_id = ?1",
        params![session_id],
        |row| {
            let events_json: String = row.get(16)?;
            let tool_usage_json: String = row.get(14)?;
            let available_tools_json: String = row.get(15)?;
            let signature_bytes: Option<Vec<u8>> = row.get(17)?;
            let features_json: Option<String> = row.get(18)?;

            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
                row.get::<_, bool>(6)?,
                SessionCounters {
                    events: row.get::<_, i64>(7)? as u64,
                    messages: row.get::<_, i64>(8)? as u64,
                    tool_uses: row.get::<_, i64>(9)? as u64,
                    errors: row.get::<_, i64>(10)? as u64,
                    tokens_input: row.get::<_, i64>(11)? as u64,
                    tokens_output: row.get::<_, i64>(12)? as u64,
                    cumulative_response_ms: row.get::<_, i64>(13)? as u64,
                },
                tool_usage_json,
                available_tools_json,
                events_json,
                signature_bytes,
                features_json,
                row.get::<_, Option<String>>(19)?,
            ))
        },
    )
    .optional()?
    .map(|row_tuple| deserialize_session(row_tuple))
    .transpose()
}

type SessionRow = (
    String,
    Option<String>,
    Option<String>,
    String,
    String,
    bool,
    bool,
    SessionCounters,
    String,
    String,
    String,
    Option<Vec<u8>>,
    Option<String>,
    Option<String>,
);

fn deserialize_session(row: SessionRow) -> Result<Session> {
    let (
        session_id,
        system_prompt_id,
        agent_id,
        created_at,
        last_activity,
        is_active,
        is_completed,
        counters,
        tool_usage_json,
        available_tools_json,
        events_json,
        signature_bytes,
        features_json,
        last_analysis_session_id,
    ) = row;

    let events: Vec<Event> = serde_json::from_str(&events_json)?;
    let tool_usage: HashMap<String, u64> = serde_json::from_str(&tool_usage_json)?;
    let available_tools: HashSet<String> = serde_json::from_str(&available_tools_json)?;
    let features: Option<SessionFeatures> = features_json.map(|s| serde_json::from_str(&s)).transpose()?;

    Ok(Session {
        session_id,
        system_prompt_id,
        agent_id,
        created_at: parse_ts(created_at),
        last_activity: parse_ts(last_activity),
        is_active,
        is_completed,
        counters,
        tool_usage,
        available_tools,
        events: VecDeque::from(events),
        max_events: usize::MAX,
        signature: signature_bytes.map(|b| decode_signature(&b)),
        features,
        last_analysis_session_id,
    })
}

fn touch_agent(conn: &Connection, system_prompt_id: &str, now: DateTime<Utc>, session: &Session) -> Result<()> {
    let existing = load_agent(conn, system_prompt_id)?;
    let mut agent = existing.unwrap_or_else(|| Agent::new(system_prompt_id.to_string(), now));
    agent.agent_id = session.agent_id.clone().or(agent.agent_id);
    agent.session_ids.insert(session.session_id.clone());
    agent.updated_at = now;
    for tool in session.available_tools.iter() {
        agent.tools_ever_seen.insert(tool.clone());
    }
    for tool in session.tool_usage.keys() {
        agent.tools_ever_used.insert(tool.clone());
    }

    conn.execute(
        "INSERT INTO agents (system_prompt_id, agent_id, display_name, description, created_at, \
         updated_at, session_ids, completed_session_count, tools_ever_seen, tools_ever_used, \
         frozen_percentiles, last_analyzed_session_count) \
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12) \
         ON CONFLICT(system_prompt_id) DO UPDATE SET \
            agent_id = ?2, updated_at = ?6, session_ids = ?7, tools_ever_seen = ?9, tools_ever_used = ?10",
        params![
            agent.system_prompt_id,
            agent.agent_id,
            agent.display_name,
            agent.description,
            agent.created_at.to_rfc3339(),
            agent.updated_at.to_rfc3339(),
            serde_json::to_string(&agent.session_ids)?,
            agent.completed_session_count as i64,
            serde_json::to_string(&agent.tools_ever_seen)?,
            serde_json::to_string(&agent.tools_ever_used)?,
            agent.frozen_percentiles.as_ref().map(serde_json::to_string).transpose()?,
            agent.last_analyzed_session_count as i64,
        ],
    )?;
    Ok(())
}

fn load_agent(conn: &Connection, system_prompt_id: &str) -> Result<Option<Agent>> {
    conn.query_row(
        "SELECT system_prompt_id, agent_id, display_name, description, created_at, updated_at, \
         session_ids, completed_session_count, tools_ever_seen, tools_ever_used, frozen_percentiles, \
         last_analyzed_session_count FROM agents WHERE system_prompt_id = ?1",
        params![system_prompt_id],
        |row| {
            Ok(Agent {
                system_prompt_id: row.get(0)?,
                agent_id: row.get(1)?,
                display_name: row.get(2)?,
                description: row.get(3)?,
                created_at: parse_ts(row.get::<_, String>(4)?),
                updated_at: parse_ts(row.get::<_, String>(5)?),
                session_ids: serde_json::from_str(&row.get::<_, String>(6)?).unwrap_or_default(),
                completed_session_count: row.get::<_, i64>(7)? as u64,
                tools_ever_seen: serde_json::from_str(&row.get::<_, String>(8)?).unwrap_or_default(),
                tools_ever_used: serde_json::from_str(&row.get::<_, String>(9)?).unwrap_or_default(),
                frozen_percentiles: row
                    .get::<_, Option<String>>(10)?
                    .and_then(|s| serde_json::from_str(&s).ok()),
                last_analyzed_session_count: row.get::<_, i64>(11)? as u64,
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

fn load_analysis_session(conn: &Connection, id: &str) -> Result<Option<relayscope_types::AnalysisSession>> {
    conn.query_row(
        "SELECT id, system_prompt_id, kind, status, started_at, completed_at, sessions_analyzed, \
         findings_count, risk_score FROM analysis_sessions WHERE id = ?1",
        params![id],
        |row| {
            let kind: String = row.get(2)?;
            let status: String = row.get(3)?;
            let sessions_analyzed: String = row.get(6)?;
            Ok(relayscope_types::AnalysisSession {
                id: row.get(0)?,
                system_prompt_id: row.get(1)?,
                kind: str_to_kind(&kind),
                status: str_to_analysis_status(&status),
                started_at: parse_ts(row.get::<_, String>(4)?),
                completed_at: row.get::<_, Option<String>>(5)?.map(parse_ts),
                sessions_analyzed: serde_json::from_str(&sessions_analyzed).unwrap_or_default(),
                findings_count: row.get::<_, i64>(7)? as u64,
                risk_score: row.get(8)?,
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

fn load_behavioral_result(conn: &Connection, analysis_session_id: &str) -> Result<Option<BehavioralResult>> {
    conn.query_row(
        "SELECT total_sessions, num_clusters, num_outliers, stability_score, predictability_score, \
         cluster_diversity, confidence, interpretation, clusters, outliers, centroid_distances \
         FROM behavioral_analysis WHERE analysis_session_id = ?1",
        params![analysis_session_id],
        |row| {
            let confidence: String = row.get(6)?;
            let clusters: String = row.get(8)?;
            let outliers: String = row.get(9)?;
            let centroid_distances: String = row.get(10)?;
            Ok(BehavioralResult {
                total_sessions: row.get::<_, i64>(0)? as usize,
                num_clusters: row.get::<_, i64>(1)? as usize,
                num_outliers: row.get::<_, i64>(2)? as usize,
                stability_score: row.get(3)?,
                predictability_score: row.get(4)?,
                cluster_diversity: row.get(5)?,
                confidence: str_to_confidence(&confidence),
                interpretation: row.get(7)?,
                clusters: serde_json::from_str(&clusters).unwrap_or_default(),
                outliers: serde_json::from_str(&outliers).unwrap_or_default(),
                centroid_distances: serde_json::from_str(&centroid_distances).unwrap_or_default(),
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

fn load_finding(conn: &Connection, finding_id: &str) -> Result<Option<Finding>> {
    conn.query_row(
        "SELECT finding_id, analysis_session_id, session_id, agent_id, file_path, line_start, line_end, \
         finding_type, severity, title, description, evidence, owasp, cwe, mitre, status, fingerprint, \
         created_at, updated_at FROM findings WHERE finding_id = ?1",
        params![finding_id],
        |row| {
            Ok(Finding {
                finding_id: row.get(0)?,
                analysis_session_id: row.get(1)?,
                session_id: row.get(2)?,
                agent_id: row.get(3)?,
                file_path: row.get(4)?,
                line_start: row.get::<_, Option<i64>>(5)?.map(|v| v as u32),
                line_end: row.get::<_, Option<i64>>(6)?.map(|v| v as u32),
                finding_type: row.get(7)?,
                severity: str_to_severity(&row.get::<_, String>(8)?),
                title: row.get(9)?,
                description: row.get(10)?,
                evidence: serde_json::from_str(&row.get::<_, String>(11)?).unwrap_or(serde_json::Value::Null),
                owasp: serde_json::from_str(&row.get::<_, String>(12)?).unwrap_or_default(),
                cwe: serde_json::from_str(&row.get::<_, String>(13)?).unwrap_or_default(),
                mitre: serde_json::from_str(&row.get::<_, String>(14)?).unwrap_or_default(),
                status: str_to_finding_status(&row.get::<_, String>(15)?),
                fingerprint: row.get(16)?,
                created_at: parse_ts(row.get::<_, String>(17)?),
                updated_at: parse_ts(row.get::<_, String>(18)?),
            })
        },
    )
    .optional()
    .map_err(Error::from)
}

fn parse_ts(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s).map(|t| t.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now())
}

fn kind_to_str(kind: relayscope_types::AnalysisKind) -> &'static str {
    use relayscope_types::AnalysisKind::*;
    match kind {
        Static => "static",
        Dynamic => "dynamic",
        Autofix => "autofix",
    }
}

fn status_to_str(status: relayscope_types::AnalysisStatus) -> &'static str {
    use relayscope_types::AnalysisStatus::*;
    match status {
        InProgress => "in_progress",
        Completed => "completed",
    }
}

fn str_to_kind(s: &str) -> relayscope_types::AnalysisKind {
    use relayscope_types::AnalysisKind::*;
    match s {
        "static" => Static,
        "autofix" => Autofix,
        _ => Dynamic,
    }
}

fn str_to_analysis_status(s: &str) -> relayscope_types::AnalysisStatus {
    use relayscope_types::AnalysisStatus::*;
    match s {
        "completed" => Completed,
        _ => InProgress,
    }
}

fn str_to_check_status(s: &str) -> relayscope_types::CheckStatus {
    use relayscope_types::CheckStatus::*;
    match s {
        "warning" => Warning,
        "critical" => Critical,
        _ => Passed,
    }
}

fn str_to_confidence(s: &str) -> relayscope_types::Confidence {
    use relayscope_types::Confidence::*;
    match s {
        "medium" => Medium,
        "low" => Low,
        _ => High,
    }
}

fn severity_to_str(severity: relayscope_types::Severity) -> &'static str {
    use relayscope_types::Severity::*;
    match severity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

fn str_to_severity(s: &str) -> relayscope_types::Severity {
    use relayscope_types::Severity::*;
    match s {
        "low" => Low,
        "high" => High,
        "critical" => Critical,
        _ => Medium,
    }
}

fn finding_status_to_str(status: FindingStatus) -> &'static str {
    match status {
        FindingStatus::Open => "open",
        FindingStatus::Fixed => "fixed",
        FindingStatus::Ignored => "ignored",
    }
}

fn str_to_finding_status(s: &str) -> FindingStatus {
    match s {
        "fixed" => FindingStatus::Fixed,
        "ignored" => FindingStatus::Ignored,
        _ => FindingStatus::Open,
    }
}

fn check_status_to_str(status: relayscope_types::CheckStatus) -> &'static str {
    use relayscope_types::CheckStatus::*;
    match status {
        Passed => "passed",
        Warning => "warning",
        Critical => "critical",
    }
}

fn confidence_to_str(confidence: relayscope_types::Confidence) -> &'static str {
    use relayscope_types::Confidence::*;
    match confidence {
        High => "high",
        Medium => "medium",
        Low => "low",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relayscope_types::{EventName, Level};

    fn event(session_id: &str, seq: u64, at: DateTime<Utc>) -> Event {
        Event::new(EventName::LlmCallStart, session_id, seq, at).with_level(Level::Info)
    }

    #[test]
    fn add_event_creates_session_and_agent() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store.add_event(&event("s1", 0, now), Some("sp1"), 10_000).unwrap();

        let session = store.get_session("s1").unwrap().unwrap();
        assert_eq!(session.counters.events, 1);
        assert!(session.is_active);

        let agent = store.get_agent("sp1").unwrap().unwrap();
        assert!(agent.session_ids.contains("s1"));
    }

    #[test]
    fn completed_sessions_are_marked_but_not_deleted() {
        let store = Store::open_in_memory().unwrap();
        let t0 = Utc::now();
        store.add_event(&event("s1", 0, t0), Some("sp1"), 10_000).unwrap();

        let later = t0 + chrono::Duration::seconds(60);
        let completed = store.check_and_complete_sessions(later, 30).unwrap();
        assert_eq!(completed, vec!["s1".to_string()]);

        let session = store.get_session("s1").unwrap().unwrap();
        assert!(session.is_completed);
        assert!(!session.is_active);
    }

    #[test]
    fn finding_dedup_refreshes_updated_at_instead_of_inserting() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        let mut finding = Finding {
            finding_id: "f1".into(),
            analysis_session_id: "a1".into(),
            session_id: "s1".into(),
            agent_id: None,
            file_path: Some("app.py".into()),
            line_start: Some(10),
            line_end: None,
            finding_type: "sql_injection".into(),
            severity: relayscope_types::Severity::High,
            title: "SQL injection".into(),
            description: "desc".into(),
            evidence: serde_json::Value::Null,
            owasp: vec![],
            cwe: vec![],
            mitre: vec![],
            status: FindingStatus::Open,
            fingerprint: "fp1".into(),
            created_at: now,
            updated_at: now,
        };

        // Need referenced rows to satisfy foreign keys.
        store
            .create_analysis_session(&relayscope_types::AnalysisSession::start(
                "a1",
                "sp1",
                relayscope_types::AnalysisKind::Dynamic,
                now,
            ))
            .unwrap();
        store.add_event(&event("s1", 0, now), Some("sp1"), 10_000).unwrap();

        let first = store.create_or_refresh_finding(&finding).unwrap();
        assert_eq!(first.finding_id, "f1");

        finding.finding_id = "f2".into();
        finding.updated_at = now + chrono::Duration::seconds(30);
        let second = store.create_or_refresh_finding(&finding).unwrap();
        assert_eq!(second.finding_id, "f1", "same fingerprint should resolve to the original row");
        assert_eq!(second.updated_at, finding.updated_at);
    }

    #[test]
    fn analysis_session_and_behavioral_result_round_trip_through_getters() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store.add_event(&event("s1", 0, now), Some("sp1"), 10_000).unwrap();

        let mut analysis = relayscope_types::AnalysisSession::start("a1", "sp1", relayscope_types::AnalysisKind::Dynamic, now);
        store.create_analysis_session(&analysis).unwrap();
        assert!(store.get_analysis_session("a1").unwrap().unwrap().status == relayscope_types::AnalysisStatus::InProgress);

        analysis.complete(now, vec!["s1".into()], 2, Some(0.3));
        store.complete_analysis_session(&analysis).unwrap();
        let fetched = store.get_analysis_session("a1").unwrap().unwrap();
        assert_eq!(fetched.status, relayscope_types::AnalysisStatus::Completed);
        assert_eq!(fetched.findings_count, 2);

        assert_eq!(store.list_analysis_sessions_for_agent("sp1").unwrap().len(), 1);
        assert!(store.get_behavioral_result("a1").unwrap().is_none());

        let result = BehavioralResult {
            total_sessions: 1,
            num_clusters: 0,
            num_outliers: 1,
            stability_score: 0.0,
            predictability_score: 0.0,
            cluster_diversity: 0.0,
            clusters: Vec::new(),
            outliers: Vec::new(),
            centroid_distances: Vec::new(),
            confidence: relayscope_types::Confidence::Low,
            interpretation: "single outlier".into(),
        };
        store.persist_behavioral_result(&result, "a1").unwrap();
        let loaded = store.get_behavioral_result("a1").unwrap().unwrap();
        assert_eq!(loaded.num_outliers, 1);
        assert_eq!(loaded.interpretation, "single outlier");
        assert_eq!(store.latest_behavioral_result("sp1").unwrap().unwrap().num_outliers, 1);
    }

    #[test]
    fn security_checks_round_trip_through_list_getter() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store.add_event(&event("s1", 0, now), Some("sp1"), 10_000).unwrap();
        store
            .create_analysis_session(&relayscope_types::AnalysisSession::start("a1", "sp1", relayscope_types::AnalysisKind::Dynamic, now))
            .unwrap();

        let check = AssessmentCheck {
            category: "token_limits".into(),
            check_id: "max_tokens".into(),
            status: relayscope_types::CheckStatus::Warning,
            value: "60000".into(),
            evidence: Default::default(),
            recommendations: vec!["reduce context size".into()],
        };
        store.persist_security_checks(std::slice::from_ref(&check), "a1").unwrap();

        let loaded = store.list_security_checks_for_analysis("a1").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].check_id, "max_tokens");
        assert_eq!(loaded[0].status, relayscope_types::CheckStatus::Warning);
    }
}
