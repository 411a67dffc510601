//! Custom assertions over agent/session/finding state.
//!
//! Provides high-level assertions that make tests more readable:
//! - Completed/active session counts for an agent
//! - Finding status and severity checks
//! - Dashboard JSON structure checks

use anyhow::{Context, Result};
use relayscope_types::{Agent, FindingStatus};
use serde_json::Value;

/// Assert that an agent has exactly `expected` completed sessions.
pub fn assert_completed_session_count(agent: &Agent, expected: u64) -> Result<()> {
    if agent.completed_session_count != expected {
        anyhow::bail!(
            "expected {} completed sessions for agent {}, got {}",
            expected,
            agent.system_prompt_id,
            agent.completed_session_count
        );
    }
    Ok(())
}

/// Assert that an agent's last-analyzed watermark has caught up to its
/// completed-session count, i.e. no analysis run is owed.
pub fn assert_fully_analyzed(agent: &Agent) -> Result<()> {
    if agent.unanalyzed_session_count() != 0 {
        anyhow::bail!(
            "agent {} still has {} unanalyzed sessions",
            agent.system_prompt_id,
            agent.unanalyzed_session_count()
        );
    }
    Ok(())
}

/// Assert that a finding has the expected status.
pub fn assert_finding_status(finding: &relayscope_types::Finding, expected: FindingStatus) -> Result<()> {
    if finding.status != expected {
        anyhow::bail!(
            "expected finding {} to have status {:?}, got {:?}",
            finding.finding_id,
            expected,
            finding.status
        );
    }
    Ok(())
}

/// Assert that dashboard JSON output contains the expected number of
/// agents under `content.agents`.
pub fn assert_agent_count(json: &Value, expected: usize) -> Result<()> {
    let agents = json["agents"]
        .as_array()
        .context("expected top-level 'agents' array in dashboard JSON")?;
    if agents.len() != expected {
        anyhow::bail!("expected {} agents, got {}", expected, agents.len());
    }
    Ok(())
}

/// Assert that dashboard JSON output contains the expected number of
/// sessions under the top-level `sessions` array.
pub fn assert_session_count(json: &Value, expected: usize) -> Result<()> {
    let sessions = json["sessions"]
        .as_array()
        .context("expected top-level 'sessions' array in dashboard JSON")?;
    if sessions.len() != expected {
        anyhow::bail!("expected {} sessions, got {}", expected, sessions.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn assert_completed_session_count_flags_a_mismatch() {
        let agent = Agent::new("sp1".to_string(), Utc::now());
        assert!(assert_completed_session_count(&agent, 0).is_ok());
        assert!(assert_completed_session_count(&agent, 1).is_err());
    }

    #[test]
    fn assert_session_count_reads_the_top_level_array() {
        let json = json!({"sessions": [{"id": "s1"}, {"id": "s2"}]});
        assert!(assert_session_count(&json, 2).is_ok());
        assert!(assert_session_count(&json, 1).is_err());
    }
}
