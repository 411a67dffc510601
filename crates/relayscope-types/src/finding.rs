use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Finding severity, independent of the behavioral outlier severity bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// `OPEN -> FIXED | IGNORED`. There is no path back to `OPEN`; a
/// regression is filed as a new finding instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingStatus {
    Open,
    Fixed,
    Ignored,
}

/// A security or behavioral finding attached to one analysis session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub finding_id: String,
    pub analysis_session_id: String,
    pub session_id: String,
    pub agent_id: Option<String>,
    pub file_path: Option<String>,
    pub line_start: Option<u32>,
    pub line_end: Option<u32>,
    pub finding_type: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub evidence: serde_json::Value,
    pub owasp: Vec<String>,
    pub cwe: Vec<String>,
    pub mitre: Vec<String>,
    pub status: FindingStatus,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Finding {
    /// Fingerprint input is `(type, file, line, snippet[:100])`; two
    /// findings with the same fingerprint are the same finding, and a
    /// second insert should refresh `updated_at` rather than create a row.
    pub fn fingerprint_input(
        finding_type: &str,
        file_path: Option<&str>,
        line_start: Option<u32>,
        snippet: &str,
    ) -> String {
        format!(
            "{}|{}|{}|{}",
            finding_type,
            file_path.unwrap_or(""),
            line_start.map(|l| l.to_string()).unwrap_or_default(),
            crate::util::truncate(snippet, 100),
        )
    }

    /// Appends `note` to the description and transitions to `status`,
    /// bumping `updated_at`.
    pub fn update_status(&mut self, status: FindingStatus, note: Option<&str>, now: DateTime<Utc>) {
        if let Some(note) = note {
            self.description.push_str("\n\n");
            self.description.push_str(note);
        }
        self.status = status;
        self.updated_at = now;
    }
}

/// `PENDING -> FIXING -> FIXED -> VERIFIED`, with side branches `DISMISSED`
/// and `IGNORED` reachable from the non-terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Pending,
    Fixing,
    Fixed,
    Verified,
    Dismissed,
    Ignored,
}

impl RecommendationStatus {
    /// Whether `self -> to` is a legal edge in the recommendation state
    /// machine. Every attempted transition, legal or not, is expected to be
    /// appended to the audit log by the caller; illegal ones are rejected
    /// before that append happens.
    pub fn can_transition_to(self, to: RecommendationStatus) -> bool {
        use RecommendationStatus::*;
        matches!(
            (self, to),
            (Pending, Fixing)
                | (Pending, Dismissed)
                | (Pending, Ignored)
                | (Fixing, Fixed)
                | (Fixing, Dismissed)
                | (Fixing, Ignored)
                | (Fixed, Verified)
                | (Fixed, Ignored)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RecommendationStatus::Verified | RecommendationStatus::Dismissed | RecommendationStatus::Ignored
        )
    }
}

/// A remediation derived from a finding, tracked through its own lifecycle
/// independent of the finding's own `status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub recommendation_id: String,
    pub finding_id: String,
    pub title: String,
    pub description: String,
    pub status: RecommendationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One row in the audit log: every attempted status transition on a
/// recommendation (or finding), whether accepted or rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub from_status: String,
    pub to_status: String,
    pub accepted: bool,
    pub at: DateTime<Utc>,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_input_is_stable_for_identical_inputs() {
        let a = Finding::fingerprint_input("sql_injection", Some("app.py"), Some(42), "SELECT * FROM x");
        let b = Finding::fingerprint_input("sql_injection", Some("app.py"), Some(42), "SELECT * FROM x");
        assert_eq!(a, b);
    }

    #[test]
    fn update_status_appends_note_and_bumps_timestamp() {
        let now = Utc::now();
        let mut finding = Finding {
            finding_id: "f1".into(),
            analysis_session_id: "a1".into(),
            session_id: "s1".into(),
            agent_id: None,
            file_path: None,
            line_start: None,
            line_end: None,
            finding_type: "x".into(),
            severity: Severity::Medium,
            title: "t".into(),
            description: "original".into(),
            evidence: serde_json::Value::Null,
            owasp: Vec::new(),
            cwe: Vec::new(),
            mitre: Vec::new(),
            status: FindingStatus::Open,
            fingerprint: "fp".into(),
            created_at: now,
            updated_at: now,
        };
        let later = now + chrono::Duration::seconds(5);
        finding.update_status(FindingStatus::Fixed, Some("patched in commit abc"), later);
        assert_eq!(finding.status, FindingStatus::Fixed);
        assert!(finding.description.contains("patched in commit abc"));
        assert_eq!(finding.updated_at, later);
    }

    #[test]
    fn recommendation_transitions_follow_the_legal_graph() {
        use RecommendationStatus::*;
        assert!(Pending.can_transition_to(Fixing));
        assert!(Fixing.can_transition_to(Fixed));
        assert!(Fixed.can_transition_to(Verified));
        assert!(Pending.can_transition_to(Ignored));
        assert!(!Pending.can_transition_to(Fixed));
        assert!(!Verified.can_transition_to(Fixing));
        assert!(Verified.is_terminal());
    }
}
