use std::collections::BTreeMap;

use relayscope_types::{
    AssessmentCheck, BehavioralResult, CheckStatus, EvaluationStatus, OutlierSeverity,
    SecurityReport, SessionFeatures,
};

/// Universal bound: sessions burning more tokens than this in a single
/// completion are flagged regardless of behavioral history.
pub const MAX_TOKENS_PER_SESSION: u64 = 50_000;
/// Universal bound: sessions issuing more tool calls than this are flagged
/// regardless of behavioral history.
pub const MAX_TOOL_CALLS_PER_SESSION: u64 = 50;

/// Minimum completed sessions before behavioral-anomaly checks run at all;
/// below this the behavioral engine has no clusters to compare against.
const MIN_SESSIONS_FOR_BEHAVIORAL_CHECKS: usize = 2;

/// Runs the universal bounds checks and behavioral-anomaly escalation rules
/// over one agent's completed sessions and (if available) its latest
/// behavioral result, producing a categorized [`SecurityReport`].
pub fn assess(sessions: &[SessionFeatures], behavioral: Option<&BehavioralResult>) -> SecurityReport {
    if sessions.is_empty() {
        return SecurityReport::new(Vec::new(), EvaluationStatus::InsufficientData);
    }

    let mut checks = Vec::new();
    checks.push(token_bound_check(sessions));
    checks.push(tool_call_bound_check(sessions));

    let evaluation_status = match behavioral {
        Some(result) if sessions.len() >= MIN_SESSIONS_FOR_BEHAVIORAL_CHECKS => {
            checks.extend(behavioral_anomaly_checks(result));
            EvaluationStatus::Complete
        }
        Some(_) | None => EvaluationStatus::Partial,
    };

    SecurityReport::new(checks, evaluation_status)
}

fn token_bound_check(sessions: &[SessionFeatures]) -> AssessmentCheck {
    let worst = sessions.iter().map(|f| f.total_tokens).max().unwrap_or(0);
    let offenders = sessions.iter().filter(|f| f.total_tokens > MAX_TOKENS_PER_SESSION).count();

    let status = if offenders > 0 {
        CheckStatus::Warning
    } else {
        CheckStatus::Passed
    };

    let mut evidence = BTreeMap::new();
    evidence.insert("max_tokens_seen".to_string(), serde_json::json!(worst));
    evidence.insert("sessions_over_bound".to_string(), serde_json::json!(offenders));

    AssessmentCheck {
        category: "token_limits".to_string(),
        check_id: "max_tokens_per_session".to_string(),
        status,
        value: format!("{worst} tokens (bound {MAX_TOKENS_PER_SESSION})"),
        evidence,
        recommendations: if offenders > 0 {
            vec!["review sessions exceeding the per-session token bound for runaway context growth".to_string()]
        } else {
            Vec::new()
        },
    }
}

fn tool_call_bound_check(sessions: &[SessionFeatures]) -> AssessmentCheck {
    let worst = sessions.iter().map(|f| f.total_tool_calls).max().unwrap_or(0);
    let offenders = sessions.iter().filter(|f| f.total_tool_calls > MAX_TOOL_CALLS_PER_SESSION).count();

    let status = if offenders > 0 {
        CheckStatus::Warning
    } else {
        CheckStatus::Passed
    };

    let mut evidence = BTreeMap::new();
    evidence.insert("max_tool_calls_seen".to_string(), serde_json::json!(worst));
    evidence.insert("sessions_over_bound".to_string(), serde_json::json!(offenders));

    AssessmentCheck {
        category: "tool_usage".to_string(),
        check_id: "max_tool_calls_per_session".to_string(),
        status,
        value: format!("{worst} tool calls (bound {MAX_TOOL_CALLS_PER_SESSION})"),
        evidence,
        recommendations: if offenders > 0 {
            vec!["investigate sessions with excessive tool-call volume for loops or retries".to_string()]
        } else {
            Vec::new()
        },
    }
}

/// Escalates to `warning`/`critical` when the behavioral engine's outlier
/// severities indicate the agent is drifting from its established
/// patterns; otherwise records a passing `behavioral_stability` check.
fn behavioral_anomaly_checks(result: &BehavioralResult) -> Vec<AssessmentCheck> {
    let critical = result.outliers.iter().filter(|o| o.severity == OutlierSeverity::Critical).count();
    let high = result.outliers.iter().filter(|o| o.severity == OutlierSeverity::High).count();

    let status = if critical > 0 {
        CheckStatus::Critical
    } else if high > 0 {
        CheckStatus::Warning
    } else {
        CheckStatus::Passed
    };

    let mut evidence = BTreeMap::new();
    evidence.insert("num_outliers".to_string(), serde_json::json!(result.num_outliers));
    evidence.insert("critical_outliers".to_string(), serde_json::json!(critical));
    evidence.insert("high_outliers".to_string(), serde_json::json!(high));
    evidence.insert("stability_score".to_string(), serde_json::json!(result.stability_score));

    let anomaly_check = AssessmentCheck {
        category: "behavioral_anomaly".to_string(),
        check_id: "outlier_severity".to_string(),
        status,
        value: format!("{} outlier(s), {} critical", result.num_outliers, critical),
        evidence,
        recommendations: match status {
            CheckStatus::Critical => vec![
                "inspect the critical-severity outlier sessions; they diverge sharply from the agent's established behavior".to_string(),
            ],
            CheckStatus::Warning => {
                vec!["review the high-severity outlier sessions for unexpected tool or token usage".to_string()]
            }
            CheckStatus::Passed => Vec::new(),
        },
    };

    let mut stability_evidence = BTreeMap::new();
    stability_evidence.insert(
        "predictability_score".to_string(),
        serde_json::json!(result.predictability_score),
    );
    stability_evidence.insert("num_clusters".to_string(), serde_json::json!(result.num_clusters));

    let stability_check = AssessmentCheck {
        category: "behavioral_anomaly".to_string(),
        check_id: "behavioral_stability".to_string(),
        status: CheckStatus::Passed,
        value: format!("stability {:.2}, predictability {:.2}", result.stability_score, result.predictability_score),
        evidence: stability_evidence,
        recommendations: Vec::new(),
    };

    vec![anomaly_check, stability_check]
}

#[cfg(test)]
mod tests {
    use super::*;
    use relayscope_types::{ClusterConfidence, ClusterInfo, Confidence, OutlierInfo, TypicalRange};

    fn features(tokens: u64, tool_calls: u64) -> SessionFeatures {
        let mut f = SessionFeatures::default();
        f.total_tokens = tokens;
        f.total_tool_calls = tool_calls;
        f
    }

    #[test]
    fn empty_sessions_yields_insufficient_data() {
        let report = assess(&[], None);
        assert_eq!(report.evaluation_status, EvaluationStatus::InsufficientData);
        assert!(report.checks.is_empty());
    }

    #[test]
    fn sessions_within_bounds_pass_both_universal_checks() {
        let sessions = vec![features(1_000, 5), features(2_000, 10)];
        let report = assess(&sessions, None);
        assert_eq!(report.overall_status(), CheckStatus::Passed);
        assert_eq!(report.passed_checks(), 2);
    }

    #[test]
    fn a_session_over_the_token_bound_triggers_a_warning() {
        let sessions = vec![features(60_000, 5)];
        let report = assess(&sessions, None);
        assert_eq!(report.overall_status(), CheckStatus::Warning);
    }

    #[test]
    fn critical_outlier_severity_escalates_overall_status() {
        let sessions = vec![features(1_000, 5), features(1_000, 5)];
        let behavioral = BehavioralResult {
            total_sessions: 2,
            num_clusters: 0,
            num_outliers: 1,
            stability_score: 0.0,
            predictability_score: 0.5,
            cluster_diversity: 0.0,
            clusters: vec![ClusterInfo {
                cluster_id: 0,
                size: 1,
                percentage: 50.0,
                session_ids: vec!["s1".into()],
                typical_duration_ms: TypicalRange::default(),
                typical_tokens: TypicalRange::default(),
                typical_tool_count: TypicalRange::default(),
                common_tools: Vec::new(),
                common_tool_sequence: Vec::new(),
                common_models: Vec::new(),
                interpretation: String::new(),
                confidence: ClusterConfidence::Low,
                centroid_signature: Vec::new(),
            }],
            outliers: vec![OutlierInfo {
                session_id: "s2".into(),
                nearest_cluster_id: Some(0),
                distance: 0.9,
                severity: OutlierSeverity::Critical,
                primary_causes: vec!["token usage outside the cluster's typical range".into()],
            }],
            centroid_distances: Vec::new(),
            confidence: Confidence::Low,
            interpretation: String::new(),
        };

        let report = assess(&sessions, Some(&behavioral));
        assert_eq!(report.overall_status(), CheckStatus::Critical);
        assert_eq!(report.critical_issues(), 1);
    }
}
