use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Outcome of one rule check over a session or behavioral result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Passed,
    Warning,
    Critical,
}

/// One categorized rule check, e.g. a universal bound ("max tokens per
/// session") or a behavioral-anomaly escalation driven by outlier severity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentCheck {
    pub category: String,
    pub check_id: String,
    pub status: CheckStatus,
    pub value: String,
    pub evidence: BTreeMap<String, serde_json::Value>,
    pub recommendations: Vec<String>,
}

impl AssessmentCheck {
    pub fn passed(&self) -> bool {
        self.status == CheckStatus::Passed
    }

    pub fn is_critical(&self) -> bool {
        self.status == CheckStatus::Critical
    }

    pub fn is_warning(&self) -> bool {
        self.status == CheckStatus::Warning
    }
}

/// Overall state of a security+behavioral evaluation, surfaced to the
/// dashboard when an analysis is incomplete or failed rather than hiding
/// partial results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationStatus {
    Complete,
    /// Security checks ran but behavioral analysis is waiting for >= 2
    /// completed sessions.
    Partial,
    InsufficientData,
    Error,
}

/// The security assessor's output: every check it ran, grouped implicitly
/// by `category`, plus the derived summary counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityReport {
    pub checks: Vec<AssessmentCheck>,
    pub evaluation_status: EvaluationStatus,
}

impl SecurityReport {
    pub fn new(checks: Vec<AssessmentCheck>, evaluation_status: EvaluationStatus) -> Self {
        Self {
            checks,
            evaluation_status,
        }
    }

    pub fn total_checks(&self) -> usize {
        self.checks.len()
    }

    pub fn passed_checks(&self) -> usize {
        self.checks.iter().filter(|c| c.passed()).count()
    }

    pub fn critical_issues(&self) -> usize {
        self.checks.iter().filter(|c| c.is_critical()).count()
    }

    pub fn warnings(&self) -> usize {
        self.checks.iter().filter(|c| c.is_warning()).count()
    }

    /// Critical if any check is critical; else warning if any check warns;
    /// else passed.
    pub fn overall_status(&self) -> CheckStatus {
        if self.critical_issues() > 0 {
            CheckStatus::Critical
        } else if self.warnings() > 0 {
            CheckStatus::Warning
        } else {
            CheckStatus::Passed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(status: CheckStatus) -> AssessmentCheck {
        AssessmentCheck {
            category: "token_limits".into(),
            check_id: "max_tokens".into(),
            status,
            value: "ok".into(),
            evidence: BTreeMap::new(),
            recommendations: Vec::new(),
        }
    }

    #[test]
    fn overall_status_escalates_to_the_worst_check() {
        let report = SecurityReport::new(
            vec![check(CheckStatus::Passed), check(CheckStatus::Warning)],
            EvaluationStatus::Complete,
        );
        assert_eq!(report.overall_status(), CheckStatus::Warning);
        assert_eq!(report.passed_checks(), 1);
        assert_eq!(report.warnings(), 1);
        assert_eq!(report.critical_issues(), 0);
    }

    #[test]
    fn overall_status_is_passed_when_nothing_escalates() {
        let report = SecurityReport::new(vec![check(CheckStatus::Passed)], EvaluationStatus::Complete);
        assert_eq!(report.overall_status(), CheckStatus::Passed);
    }

    #[test]
    fn critical_outranks_warning() {
        let report = SecurityReport::new(
            vec![
                check(CheckStatus::Warning),
                check(CheckStatus::Critical),
                check(CheckStatus::Passed),
            ],
            EvaluationStatus::Complete,
        );
        assert_eq!(report.overall_status(), CheckStatus::Critical);
        assert_eq!(report.total_checks(), 3);
    }
}
