use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// p25/p50/p75/p90/p95 over one distribution, frozen from the first batch
/// of completed sessions and never recomputed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PercentileSet {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p90: f64,
    pub p95: f64,
}

/// Per-agent distribution anchors used to bucket shingle values
/// deterministically. Computed once there are >= 5 completed sessions and
/// never changed again, so historical signatures stay comparable to new
/// ones.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FrozenPercentiles {
    pub duration_ms: PercentileSet,
    pub total_tokens: PercentileSet,
    pub tool_call_count: PercentileSet,
}

/// The aggregate unit keyed by `system_prompt_id`. Multiple system-prompt
/// ids may report the same coarse `agent_id`; this record aggregates at
/// the finer grain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub system_prompt_id: String,
    pub agent_id: Option<String>,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub session_ids: BTreeSet<String>,
    pub completed_session_count: u64,
    pub tools_ever_seen: HashSet<String>,
    pub tools_ever_used: HashSet<String>,
    pub frozen_percentiles: Option<FrozenPercentiles>,
    pub last_analyzed_session_count: u64,
}

impl Agent {
    pub fn new(system_prompt_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            system_prompt_id: system_prompt_id.into(),
            agent_id: None,
            display_name: None,
            description: None,
            created_at: now,
            updated_at: now,
            session_ids: BTreeSet::new(),
            completed_session_count: 0,
            tools_ever_seen: HashSet::new(),
            tools_ever_used: HashSet::new(),
            frozen_percentiles: None,
            last_analyzed_session_count: 0,
        }
    }

    /// `last_analyzed_session_count <= completed_session_count` at all times.
    pub fn upholds_analysis_watermark_invariant(&self) -> bool {
        self.last_analyzed_session_count <= self.completed_session_count
    }

    pub fn unanalyzed_session_count(&self) -> u64 {
        self.completed_session_count
            .saturating_sub(self.last_analyzed_session_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_agent_has_no_frozen_percentiles() {
        let agent = Agent::new("sp1", Utc::now());
        assert!(agent.frozen_percentiles.is_none());
        assert_eq!(agent.unanalyzed_session_count(), 0);
    }

    #[test]
    fn watermark_invariant_holds_after_completion() {
        let mut agent = Agent::new("sp1", Utc::now());
        agent.completed_session_count = 5;
        agent.last_analyzed_session_count = 5;
        assert!(agent.upholds_analysis_watermark_invariant());
        assert_eq!(agent.unanalyzed_session_count(), 0);

        agent.completed_session_count = 7;
        assert!(agent.upholds_analysis_watermark_invariant());
        assert_eq!(agent.unanalyzed_session_count(), 2);
    }
}
