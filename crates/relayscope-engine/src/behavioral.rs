use std::collections::{BTreeMap, BTreeSet};

use relayscope_types::{
    BehavioralResult, CentroidDistance, ClusterConfidence, ClusterInfo, Confidence,
    FrozenPercentiles, OutlierInfo, OutlierSeverity, PercentileSet, SessionFeatures, TypicalRange,
};

/// Width of the MinHash signature. Lower K trades clustering accuracy for
/// storage and compute; 512 is the default chosen for stable Jaccard
/// estimates at the session volumes this engine expects to see.
pub const SIGNATURE_WIDTH: usize = 512;

/// Jaccard similarity threshold above which two sessions are considered
/// part of the same behavioral cluster.
pub const CLUSTER_THRESHOLD: f64 = 0.6;

/// Minimum number of completed sessions before an agent's distributional
/// percentiles are frozen.
pub const MIN_SESSIONS_FOR_PERCENTILE_FREEZE: usize = 5;

/// A completed session's features paired with its (possibly just-computed)
/// MinHash signature, as handed to [`analyze`] by the analysis runner.
#[derive(Debug, Clone)]
pub struct ScoredSession {
    pub session_id: String,
    pub features: SessionFeatures,
    pub signature: Vec<u64>,
}

/// Computes p25/p50/p75/p90/p95 over a batch of sessions' durations, token
/// totals and tool-call counts. Called once an agent crosses
/// [`MIN_SESSIONS_FOR_PERCENTILE_FREEZE`] completed sessions; the result is
/// stored on the agent and never recomputed.
pub fn freeze_percentiles(batch: &[SessionFeatures]) -> FrozenPercentiles {
    let durations: Vec<f64> = batch.iter().map(|f| f.total_duration_ms as f64).collect();
    let tokens: Vec<f64> = batch.iter().map(|f| f.total_tokens as f64).collect();
    let tool_calls: Vec<f64> = batch.iter().map(|f| f.total_tool_calls as f64).collect();
    FrozenPercentiles {
        duration_ms: percentile_set(&durations),
        total_tokens: percentile_set(&tokens),
        tool_call_count: percentile_set(&tool_calls),
    }
}

fn percentile_set(values: &[f64]) -> PercentileSet {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    PercentileSet {
        p25: percentile(&sorted, 0.25),
        p50: percentile(&sorted, 0.50),
        p75: percentile(&sorted, 0.75),
        p90: percentile(&sorted, 0.90),
        p95: percentile(&sorted, 0.95),
    }
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = (p * (sorted.len() as f64 - 1.0)).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn bucket(value: f64, percentiles: &PercentileSet) -> &'static str {
    if value <= percentiles.p25 {
        "p0_25"
    } else if value <= percentiles.p50 {
        "p25_50"
    } else if value <= percentiles.p75 {
        "p50_75"
    } else if value <= percentiles.p90 {
        "p75_90"
    } else if value <= percentiles.p95 {
        "p90_95"
    } else {
        "p95_plus"
    }
}

/// Builds the shingle set for one session's features: tool names, collapsed
/// tool-sequence edges, model tags, and percentile-bucketed duration/token/
/// tool-call counts.
pub fn shingles(features: &SessionFeatures, percentiles: &FrozenPercentiles) -> BTreeSet<String> {
    let mut set = BTreeSet::new();
    for tool in &features.tools_used {
        set.insert(format!("tool:{tool}"));
    }
    for pair in features.tool_sequences.windows(2) {
        set.insert(format!("seq:{}->{}", pair[0], pair[1]));
    }
    for model in &features.models {
        set.insert(format!("model:{model}"));
    }
    set.insert(format!(
        "duration:{}",
        bucket(features.total_duration_ms as f64, &percentiles.duration_ms)
    ));
    set.insert(format!(
        "tokens:{}",
        bucket(features.total_tokens as f64, &percentiles.total_tokens)
    ));
    set.insert(format!(
        "tools:{}",
        bucket(features.total_tool_calls as f64, &percentiles.tool_call_count)
    ));
    set
}

/// 64-bit splitmix step, used both to seed each of the K hash functions and
/// to mix a shingle's base hash against that seed.
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    bytes.iter().fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

/// `h_i(x)` for `i` in `0..SIGNATURE_WIDTH`: the shingle's base hash mixed
/// against the i-th seed, giving K independent-enough hash functions from
/// one base hash.
fn hash_at(base: u64, i: usize) -> u64 {
    splitmix64(base ^ splitmix64(i as u64))
}

/// Computes the K-wide MinHash signature over a shingle set: for each of
/// the K hash functions, the minimum hash value across all shingles.
pub fn minhash_signature(shingles: &BTreeSet<String>) -> Vec<u64> {
    let mut signature = vec![u64::MAX; SIGNATURE_WIDTH];
    for shingle in shingles {
        let base = fnv1a(shingle.as_bytes());
        for (i, slot) in signature.iter_mut().enumerate() {
            let h = hash_at(base, i);
            if h < *slot {
                *slot = h;
            }
        }
    }
    signature
}

/// Convenience wrapper: derive the shingle set and signature in one call,
/// as used when a session completes and has no cached signature yet.
pub fn compute_signature(features: &SessionFeatures, percentiles: &FrozenPercentiles) -> Vec<u64> {
    minhash_signature(&shingles(features, percentiles))
}

/// Fraction of coordinates that agree between two equal-length signatures.
pub fn jaccard_similarity(a: &[u64], b: &[u64]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let matches = a.iter().zip(b).filter(|(x, y)| x == y).count();
    matches as f64 / a.len() as f64
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Runs the full behavioral pipeline (clustering through confidence tiers)
/// over an agent's completed sessions, each already carrying a computed
/// MinHash signature.
pub fn analyze(sessions: &[ScoredSession]) -> BehavioralResult {
    let total = sessions.len();
    if total == 0 {
        return BehavioralResult {
            total_sessions: 0,
            num_clusters: 0,
            num_outliers: 0,
            stability_score: 0.0,
            predictability_score: 0.0,
            cluster_diversity: 0.0,
            clusters: Vec::new(),
            outliers: Vec::new(),
            centroid_distances: Vec::new(),
            confidence: Confidence::Low,
            interpretation: "no completed sessions yet".to_string(),
        };
    }

    let mut uf = UnionFind::new(total);
    for i in 0..total {
        for j in (i + 1)..total {
            if jaccard_similarity(&sessions[i].signature, &sessions[j].signature) >= CLUSTER_THRESHOLD {
                uf.union(i, j);
            }
        }
    }

    let mut components: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for i in 0..total {
        components.entry(uf.find(i)).or_default().push(i);
    }

    let mut cluster_member_indices: Vec<Vec<usize>> = Vec::new();
    let mut outlier_indices: Vec<usize> = Vec::new();
    for members in components.into_values() {
        if members.len() >= 2 {
            cluster_member_indices.push(members);
        } else {
            outlier_indices.extend(members);
        }
    }
    // Stable, deterministic ordering: largest cluster first.
    cluster_member_indices.sort_by(|a, b| b.len().cmp(&a.len()));

    let clusters: Vec<ClusterInfo> = cluster_member_indices
        .iter()
        .enumerate()
        .map(|(cluster_id, members)| build_cluster(cluster_id, members, sessions, total))
        .collect();

    let centroid_distances = centroid_pairwise_distances(&clusters);

    let outliers: Vec<OutlierInfo> = outlier_indices
        .iter()
        .map(|&idx| build_outlier(&sessions[idx], &clusters))
        .collect();

    let largest_cluster_size = clusters.first().map(|c| c.size).unwrap_or(0);
    let stability_score = largest_cluster_size as f64 / total as f64;
    let predictability_score = 1.0 - (outliers.len() as f64 / total as f64);
    let cluster_diversity = shannon_diversity(&clusters);
    let confidence = classify_confidence(&clusters, outliers.len(), total);
    let interpretation = summarize(&clusters, outliers.len(), total, stability_score);

    BehavioralResult {
        total_sessions: total,
        num_clusters: clusters.len(),
        num_outliers: outliers.len(),
        stability_score,
        predictability_score,
        cluster_diversity,
        clusters,
        outliers,
        centroid_distances,
        confidence,
        interpretation,
    }
}

fn build_cluster(
    cluster_id: usize,
    members: &[usize],
    sessions: &[ScoredSession],
    total_sessions: usize,
) -> ClusterInfo {
    let session_ids: Vec<String> = members.iter().map(|&i| sessions[i].session_id.clone()).collect();

    let durations: Vec<f64> = members
        .iter()
        .map(|&i| sessions[i].features.total_duration_ms as f64)
        .collect();
    let tokens: Vec<f64> = members
        .iter()
        .map(|&i| sessions[i].features.total_tokens as f64)
        .collect();
    let tool_counts: Vec<f64> = members
        .iter()
        .map(|&i| sessions[i].features.total_tool_calls as f64)
        .collect();

    let mut tool_frequency: BTreeMap<&str, usize> = BTreeMap::new();
    let mut model_frequency: BTreeMap<&str, usize> = BTreeMap::new();
    for &i in members {
        for tool in &sessions[i].features.tools_used {
            *tool_frequency.entry(tool.as_str()).or_insert(0) += 1;
        }
        for model in &sessions[i].features.models {
            *model_frequency.entry(model.as_str()).or_insert(0) += 1;
        }
    }

    let common_tools = top_n_by_frequency(&tool_frequency, 3);
    let common_models = top_n_by_frequency(&model_frequency, 3);
    let common_tool_sequence = longest_common_prefix(
        members.iter().map(|&i| sessions[i].features.tool_sequences.as_slice()),
    );

    let size = members.len();
    let percentage = size as f64 / total_sessions as f64 * 100.0;
    let confidence = if size >= 3 {
        ClusterConfidence::Normal
    } else {
        ClusterConfidence::Low
    };
    let centroid_signature = centroid_signature(members.iter().map(|&i| sessions[i].signature.as_slice()));

    let interpretation = format!(
        "{size} sessions ({percentage:.0}% of total) share a common pattern: tools {common_tools:?}, \
         typical duration {duration_median:.0}ms, typical tokens {token_median:.0}",
        duration_median = typical_range(&durations).median,
        token_median = typical_range(&tokens).median,
    );

    ClusterInfo {
        cluster_id,
        size,
        percentage,
        session_ids,
        typical_duration_ms: typical_range(&durations),
        typical_tokens: typical_range(&tokens),
        typical_tool_count: typical_range(&tool_counts),
        common_tools,
        common_tool_sequence,
        common_models,
        interpretation,
        confidence,
        centroid_signature,
    }
}

fn top_n_by_frequency(frequency: &BTreeMap<&str, usize>, n: usize) -> Vec<String> {
    let mut entries: Vec<(&str, usize)> = frequency.iter().map(|(&k, &v)| (k, v)).collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    entries.into_iter().take(n).map(|(name, _)| name.to_string()).collect()
}

/// Longest common prefix across a set of (already collapsed) tool
/// sequences, used as the cluster's "common tool sequence".
fn longest_common_prefix<'a>(sequences: impl Iterator<Item = &'a [String]>) -> Vec<String> {
    let mut sequences: Vec<&[String]> = sequences.collect();
    let Some(first) = sequences.pop() else {
        return Vec::new();
    };
    let mut prefix_len = first.len();
    for seq in sequences {
        prefix_len = prefix_len.min(seq.len());
        let matched = first.iter().zip(seq.iter()).take_while(|(a, b)| a == b).count();
        prefix_len = prefix_len.min(matched);
    }
    first[..prefix_len].to_vec()
}

fn typical_range(values: &[f64]) -> TypicalRange {
    if values.is_empty() {
        return TypicalRange::default();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    TypicalRange {
        median: percentile(&sorted, 0.50),
        p10: percentile(&sorted, 0.10),
        p90: percentile(&sorted, 0.90),
    }
}

/// Element-wise mode over member signatures; ties broken by first-seen
/// member (iteration order), matching the "mode, or first-seen" rule.
fn centroid_signature<'a>(members: impl Iterator<Item = &'a [u64]>) -> Vec<u64> {
    let members: Vec<&[u64]> = members.collect();
    if members.is_empty() {
        return Vec::new();
    }
    (0..SIGNATURE_WIDTH)
        .map(|i| {
            let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
            for sig in &members {
                *counts.entry(sig[i]).or_insert(0) += 1;
            }
            let best = counts.values().copied().max().unwrap_or(0);
            members
                .iter()
                .find_map(|sig| (counts[&sig[i]] == best).then(|| sig[i]))
                .unwrap_or(members[0][i])
        })
        .collect()
}

fn centroid_pairwise_distances(clusters: &[ClusterInfo]) -> Vec<CentroidDistance> {
    let mut distances = Vec::new();
    for i in 0..clusters.len() {
        for j in (i + 1)..clusters.len() {
            let similarity =
                jaccard_similarity(&clusters[i].centroid_signature, &clusters[j].centroid_signature);
            distances.push(CentroidDistance {
                cluster_a: clusters[i].cluster_id,
                cluster_b: clusters[j].cluster_id,
                distance: 1.0 - similarity,
            });
        }
    }
    distances
}

fn build_outlier(session: &ScoredSession, clusters: &[ClusterInfo]) -> OutlierInfo {
    let nearest = clusters
        .iter()
        .map(|c| (c, jaccard_similarity(&session.signature, &c.centroid_signature)))
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

    let (nearest_cluster_id, distance) = match nearest {
        Some((cluster, similarity)) => (Some(cluster.cluster_id), 1.0 - similarity),
        None => (None, 1.0),
    };
    let severity = OutlierSeverity::from_distance(distance);

    let mut primary_causes = Vec::new();
    if let Some((cluster, _)) = nearest {
        let duration = session.features.total_duration_ms as f64;
        if duration < cluster.typical_duration_ms.p10 || duration > cluster.typical_duration_ms.p90 {
            primary_causes.push("duration outside the cluster's typical range".to_string());
        }
        let tokens = session.features.total_tokens as f64;
        if tokens < cluster.typical_tokens.p10 || tokens > cluster.typical_tokens.p90 {
            primary_causes.push("token usage outside the cluster's typical range".to_string());
        }
        let tool_count = session.features.total_tool_calls as f64;
        if tool_count < cluster.typical_tool_count.p10 || tool_count > cluster.typical_tool_count.p90 {
            primary_causes.push("tool-call count outside the cluster's typical range".to_string());
        }
        if !session.features.tools_used.iter().any(|t| cluster.common_tools.contains(t)) {
            primary_causes.push("uses none of the cluster's common tools".to_string());
        }
    } else {
        primary_causes.push("no cluster has formed yet to compare against".to_string());
    }

    OutlierInfo {
        session_id: session.session_id.clone(),
        nearest_cluster_id,
        distance,
        severity,
        primary_causes,
    }
}

fn shannon_diversity(clusters: &[ClusterInfo]) -> f64 {
    if clusters.len() < 2 {
        return 0.0;
    }
    let total: usize = clusters.iter().map(|c| c.size).sum();
    if total == 0 {
        return 0.0;
    }
    let entropy: f64 = clusters
        .iter()
        .map(|c| {
            let p = c.size as f64 / total as f64;
            if p > 0.0 {
                -p * p.ln()
            } else {
                0.0
            }
        })
        .sum();
    entropy / (clusters.len() as f64).ln()
}

/// Confidence tiers transcribed from the behavioral-confidence thresholds:
/// `high` needs a cluster shape of >= 30 (one cluster), >= 80 (two), or
/// >= 150 (three), and an outlier rate <= 5% once total sessions reach 200;
/// `medium` relaxes both the shape (>= 15/40/75) and the outlier bound
/// (<= 10%); everything else is `low`.
fn classify_confidence(clusters: &[ClusterInfo], num_outliers: usize, total: usize) -> Confidence {
    let mut sizes: Vec<usize> = clusters.iter().map(|c| c.size).collect();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    let top1 = sizes.first().copied().unwrap_or(0);
    let top2: usize = sizes.iter().take(2).sum();
    let top3: usize = sizes.iter().take(3).sum();

    let outlier_rate = num_outliers as f64 / total as f64;
    let outlier_ok_high = total < 200 || outlier_rate <= 0.05;
    let outlier_ok_medium = total < 200 || outlier_rate <= 0.10;

    let shape_high = top1 >= 30 || (sizes.len() >= 2 && top2 >= 80) || (sizes.len() >= 3 && top3 >= 150);
    let shape_medium = top1 >= 15 || (sizes.len() >= 2 && top2 >= 40) || (sizes.len() >= 3 && top3 >= 75);

    if shape_high && outlier_ok_high {
        Confidence::High
    } else if shape_medium && outlier_ok_medium {
        Confidence::Medium
    } else {
        Confidence::Low
    }
}

fn summarize(clusters: &[ClusterInfo], num_outliers: usize, total: usize, stability: f64) -> String {
    if clusters.is_empty() {
        return format!("{total} sessions observed, no repeating pattern has formed yet");
    }
    format!(
        "{total} sessions form {num_clusters} behavioral cluster(s) and {num_outliers} outlier(s); \
         the largest pattern accounts for {pct:.0}% of sessions",
        num_clusters = clusters.len(),
        pct = stability * 100.0,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use relayscope_types::SessionFeatures;

    fn features(tools: &[&str], tokens: u64, duration_ms: u64, tool_calls: u64) -> SessionFeatures {
        let mut f = SessionFeatures::default();
        f.tools_used = tools.iter().map(|s| s.to_string()).collect();
        f.tool_sequences = tools.iter().map(|s| s.to_string()).collect();
        f.total_tokens = tokens;
        f.total_duration_ms = duration_ms;
        f.total_tool_calls = tool_calls;
        f
    }

    fn frozen() -> FrozenPercentiles {
        freeze_percentiles(&[
            features(&["Read"], 100, 100, 1),
            features(&["Read"], 200, 200, 2),
            features(&["Read"], 300, 300, 3),
            features(&["Read"], 400, 400, 4),
            features(&["Read"], 500, 500, 5),
        ])
    }

    #[test]
    fn identical_sessions_have_jaccard_similarity_one() {
        let percentiles = frozen();
        let f = features(&["Read", "Bash"], 250, 250, 2);
        let sig_a = compute_signature(&f, &percentiles);
        let sig_b = compute_signature(&f, &percentiles);
        assert_eq!(jaccard_similarity(&sig_a, &sig_b), 1.0);
    }

    #[test]
    fn disjoint_feature_sets_cluster_separately_from_a_divergent_pair() {
        let percentiles = frozen();
        let mut sessions = Vec::new();
        for i in 0..10 {
            let f = features(&["Read", "Edit"], 250, 250, 2);
            sessions.push(ScoredSession {
                session_id: format!("cluster-{i}"),
                signature: compute_signature(&f, &percentiles),
                features: f,
            });
        }
        // Two outliers with mutually disjoint shingle sets (different tools,
        // sequences, and percentile buckets), so each lands as its own
        // singleton component rather than clustering with the other.
        let divergent = [
            features(&["Bash", "WebFetch", "Grep"], 50_000, 50_000, 40),
            features(&["Write", "Glob"], 150, 150, 1),
        ];
        for (i, f) in divergent.into_iter().enumerate() {
            sessions.push(ScoredSession {
                session_id: format!("outlier-{i}"),
                signature: compute_signature(&f, &percentiles),
                features: f,
            });
        }

        let result = analyze(&sessions);
        assert_eq!(result.num_clusters, 1);
        assert_eq!(result.clusters[0].size, 10);
        assert_eq!(result.num_outliers, 2);
        assert!((result.stability_score - 10.0 / 12.0).abs() < 1e-9);
        assert!((result.predictability_score - 10.0 / 12.0).abs() < 1e-9);
    }

    #[test]
    fn empty_input_yields_low_confidence_with_no_clusters() {
        let result = analyze(&[]);
        assert_eq!(result.total_sessions, 0);
        assert_eq!(result.confidence, Confidence::Low);
    }
}
