use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of analysis a run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisKind {
    Static,
    Dynamic,
    Autofix,
}

/// `IN_PROGRESS -> COMPLETED` is the only transition; terminal once
/// completed. The runner retries by starting a fresh analysis session, not
/// by reopening this one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    InProgress,
    Completed,
}

/// The record of one analysis run over a set of completed conversations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub id: String,
    pub system_prompt_id: String,
    pub kind: AnalysisKind,
    pub status: AnalysisStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sessions_analyzed: Vec<String>,
    pub findings_count: u64,
    pub risk_score: Option<f64>,
}

impl AnalysisSession {
    pub fn start(
        id: impl Into<String>,
        system_prompt_id: impl Into<String>,
        kind: AnalysisKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            system_prompt_id: system_prompt_id.into(),
            kind,
            status: AnalysisStatus::InProgress,
            started_at: now,
            completed_at: None,
            sessions_analyzed: Vec::new(),
            findings_count: 0,
            risk_score: None,
        }
    }

    /// Complete the run, whether or not it produced a usable result. On
    /// `AnalysisComputeError` the caller still calls this with zero
    /// findings and no risk score so the row does not wedge `IN_PROGRESS`
    /// forever.
    pub fn complete(
        &mut self,
        now: DateTime<Utc>,
        sessions_analyzed: Vec<String>,
        findings_count: u64,
        risk_score: Option<f64>,
    ) {
        self.status = AnalysisStatus::Completed;
        self.completed_at = Some(now);
        self.sessions_analyzed = sessions_analyzed;
        self.findings_count = findings_count;
        self.risk_score = risk_score;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_starts_in_progress_and_completes() {
        let now = Utc::now();
        let mut session = AnalysisSession::start("a1", "sp1", AnalysisKind::Dynamic, now);
        assert_eq!(session.status, AnalysisStatus::InProgress);
        assert!(session.completed_at.is_none());

        session.complete(now, vec!["s1".into(), "s2".into()], 3, Some(0.42));
        assert_eq!(session.status, AnalysisStatus::Completed);
        assert_eq!(session.findings_count, 3);
        assert_eq!(session.risk_score, Some(0.42));
    }

    #[test]
    fn failed_compute_still_completes_with_zero_findings() {
        let now = Utc::now();
        let mut session = AnalysisSession::start("a1", "sp1", AnalysisKind::Dynamic, now);
        session.complete(now, Vec::new(), 0, None);
        assert_eq!(session.status, AnalysisStatus::Completed);
        assert_eq!(session.findings_count, 0);
        assert!(session.risk_score.is_none());
    }
}
