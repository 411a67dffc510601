use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Summary statistics over a population of token counts (one session's
/// requests, for input or output tokens independently).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenStats {
    pub mean: f64,
    pub stdev: f64,
    pub max: u64,
    pub p95: f64,
}

/// The structured behavioral fingerprint computed once a session completes.
/// Cached on the session row and never recomputed unless the session is
/// reactivated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionFeatures {
    pub tools_used: BTreeSet<String>,
    /// Tool-call order with consecutive repeats collapsed (e.g. `Read,
    /// Read, Bash` becomes `Read, Bash`) per the adopted resolution of the
    /// "tool sequence" ambiguity between raw and collapsed call order.
    pub tool_sequences: Vec<String>,
    pub tool_timings_ms: Vec<u64>,
    pub models: BTreeSet<String>,
    pub request_count: u64,
    pub input_tokens: TokenStats,
    pub output_tokens: TokenStats,
    pub total_duration_ms: u64,
    pub event_count: u64,
    pub avg_inter_event_interval_ms: f64,
    pub total_tokens: u64,
    pub total_tool_calls: u64,
}

/// Confidence that a cluster's characteristics are representative, driven
/// purely by member count (`normal` at 3+, `low` at exactly 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterConfidence {
    Normal,
    Low,
}

/// A range spanning the 10th to 90th percentile around a median, used to
/// describe a cluster's "typical" duration, token count, or tool-call count.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TypicalRange {
    pub median: f64,
    pub p10: f64,
    pub p90: f64,
}

/// One connected component of the Jaccard-similarity graph with 2 or more
/// members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterInfo {
    pub cluster_id: usize,
    pub size: usize,
    pub percentage: f64,
    pub session_ids: Vec<String>,
    pub typical_duration_ms: TypicalRange,
    pub typical_tokens: TypicalRange,
    pub typical_tool_count: TypicalRange,
    pub common_tools: Vec<String>,
    pub common_tool_sequence: Vec<String>,
    pub common_models: Vec<String>,
    pub interpretation: String,
    pub confidence: ClusterConfidence,
    pub centroid_signature: Vec<u64>,
}

/// Severity bin for an outlier's distance to its nearest cluster centroid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutlierSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl OutlierSeverity {
    /// `low` < 0.5, `medium` < 0.7, `high` < 0.85, `critical` >= 0.85.
    pub fn from_distance(distance: f64) -> Self {
        if distance < 0.5 {
            OutlierSeverity::Low
        } else if distance < 0.7 {
            OutlierSeverity::Medium
        } else if distance < 0.85 {
            OutlierSeverity::High
        } else {
            OutlierSeverity::Critical
        }
    }
}

/// A session that did not join any cluster of size >= 2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutlierInfo {
    pub session_id: String,
    pub nearest_cluster_id: Option<usize>,
    pub distance: f64,
    pub severity: OutlierSeverity,
    pub primary_causes: Vec<String>,
}

/// Pairwise Jaccard distance between two cluster centroids, surfacing
/// inter-cluster closeness.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CentroidDistance {
    pub cluster_a: usize,
    pub cluster_b: usize,
    pub distance: f64,
}

/// Confidence in the overall behavioral result, driven by total sessions,
/// cluster count/size, and outlier rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// The output of one run of the behavioral engine over an agent's
/// completed sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehavioralResult {
    pub total_sessions: usize,
    pub num_clusters: usize,
    pub num_outliers: usize,
    pub stability_score: f64,
    pub predictability_score: f64,
    pub cluster_diversity: f64,
    pub clusters: Vec<ClusterInfo>,
    pub outliers: Vec<OutlierInfo>,
    pub centroid_distances: Vec<CentroidDistance>,
    pub confidence: Confidence,
    pub interpretation: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outlier_severity_bins_match_thresholds() {
        assert_eq!(OutlierSeverity::from_distance(0.1), OutlierSeverity::Low);
        assert_eq!(OutlierSeverity::from_distance(0.5), OutlierSeverity::Medium);
        assert_eq!(OutlierSeverity::from_distance(0.7), OutlierSeverity::High);
        assert_eq!(OutlierSeverity::from_distance(0.85), OutlierSeverity::Critical);
        assert_eq!(OutlierSeverity::from_distance(0.99), OutlierSeverity::Critical);
    }

    #[test]
    fn session_features_default_is_empty() {
        let features = SessionFeatures::default();
        assert!(features.tools_used.is_empty());
        assert_eq!(features.total_tokens, 0);
    }
}
