use std::collections::HashSet;
use std::sync::Mutex;

use chrono::Utc;
use relayscope_engine::behavioral::{self, ScoredSession};
use relayscope_store::Store;
use relayscope_types::{AnalysisKind, AnalysisSession};

use crate::Result;

/// Minimum completed sessions before an agent is eligible for a risk
/// analysis run at all.
pub const MIN_SESSIONS_FOR_RISK_ANALYSIS: u64 = 5;

/// Schedules and runs behavioral + security analysis for an agent once it
/// has accumulated enough completed sessions, re-triggering itself if more
/// sessions complete while a run is in flight.
///
/// The in-flight guard lives only in `_running`, never persisted. A process
/// restart mid-analysis loses track of the run, and the next `trigger`
/// (from the session monitor, or the startup recovery scan) starts a fresh
/// one. There is no resumable analysis state to reconcile.
pub struct AnalysisRunner {
    store: std::sync::Arc<Store>,
    min_sessions: u64,
    running: Mutex<HashSet<String>>,
}

impl AnalysisRunner {
    pub fn new(store: std::sync::Arc<Store>, min_sessions: u64) -> Self {
        Self {
            store,
            min_sessions,
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Called whenever a session completes for `system_prompt_id`, or by
    /// the startup recovery scan. Starts a run only if `should_run` allows
    /// it; if a run is already in flight for this agent, does nothing.
    /// `run_once` re-checks `should_run` after it finishes and loops, so a
    /// burst of completions during one run is not lost.
    pub fn trigger(&self, system_prompt_id: &str) -> Result<Option<AnalysisSession>> {
        if !self.should_run(system_prompt_id)? {
            return Ok(None);
        }
        {
            let mut running = self.running.lock().unwrap();
            if !running.insert(system_prompt_id.to_string()) {
                return Ok(None);
            }
        }
        let result = self.run_loop(system_prompt_id);
        self.running.lock().unwrap().remove(system_prompt_id);
        result
    }

    /// An agent is due for analysis once it has at least `min_sessions`
    /// completed sessions and has advanced past its last-analyzed
    /// watermark, mirroring [`relayscope_types::Agent::unanalyzed_session_count`].
    pub fn should_run(&self, system_prompt_id: &str) -> Result<bool> {
        let Some(agent) = self.store.get_agent(system_prompt_id)? else {
            return Ok(false);
        };
        Ok(agent.completed_session_count >= self.min_sessions.max(MIN_SESSIONS_FOR_RISK_ANALYSIS)
            && agent.unanalyzed_session_count() > 0)
    }

    /// Runs `run_once`, then immediately re-checks `should_run`. If more
    /// sessions completed for this agent while the run was computing, a
    /// fresh analysis session starts right away instead of waiting for the
    /// next external trigger.
    fn run_loop(&self, system_prompt_id: &str) -> Result<Option<AnalysisSession>> {
        let mut last = None;
        loop {
            last = Some(self.run_once(system_prompt_id)?);
            if !self.should_run(system_prompt_id)? {
                break;
            }
        }
        Ok(last)
    }

    /// One analysis pass: snapshot completed sessions, freeze percentiles
    /// on first eligibility, compute signatures for any session that
    /// predates the freeze, cluster, assess, and persist. Always completes
    /// the analysis session row, even on zero findings, so it never wedges
    /// `IN_PROGRESS` - a compute or store error past this point still
    /// completes the row with zero findings and leaves the analyzed-session
    /// watermark untouched, so the next trigger retries.
    pub fn run_once(&self, system_prompt_id: &str) -> Result<AnalysisSession> {
        let now = Utc::now();
        let analysis_id = relayscope_core::new_analysis_session_id();
        let mut analysis = AnalysisSession::start(analysis_id, system_prompt_id, AnalysisKind::Dynamic, now);
        self.store.create_analysis_session(&analysis)?;

        match self.compute_and_persist(system_prompt_id, &analysis.id) {
            Ok((session_ids, findings_count, risk_score)) => {
                analysis.complete(Utc::now(), session_ids, findings_count, risk_score);
            }
            Err(err) => {
                tracing::warn!(
                    system_prompt_id,
                    error = %err,
                    "analysis run failed; completing with zero findings"
                );
                analysis.complete(Utc::now(), Vec::new(), 0, None);
            }
        }
        self.store.complete_analysis_session(&analysis)?;
        Ok(analysis)
    }

    /// The fallible core of [`run_once`]: everything after the row is
    /// created and before it is completed. Kept separate so `run_once` can
    /// catch any error here and still complete the row.
    fn compute_and_persist(
        &self,
        system_prompt_id: &str,
        analysis_id: &str,
    ) -> Result<(Vec<String>, u64, Option<f64>)> {
        let mut sessions = self.store.snapshot_agent_sessions(system_prompt_id)?;
        if sessions.is_empty() {
            return Ok((Vec::new(), 0, None));
        }

        let agent = self.store.get_agent(system_prompt_id)?;
        let percentiles = match agent.as_ref().and_then(|a| a.frozen_percentiles.clone()) {
            Some(percentiles) => percentiles,
            None if sessions.len() >= behavioral::MIN_SESSIONS_FOR_PERCENTILE_FREEZE => {
                let batch: Vec<_> = sessions.iter().filter_map(|s| s.features.clone()).collect();
                let percentiles = behavioral::freeze_percentiles(&batch);
                self.store.freeze_agent_percentiles(system_prompt_id, &percentiles)?;
                percentiles
            }
            None => Default::default(),
        };

        let scored: Vec<ScoredSession> = sessions
            .drain(..)
            .filter_map(|session| {
                let features = session.features?;
                let signature = session
                    .signature
                    .clone()
                    .unwrap_or_else(|| behavioral::compute_signature(&features, &percentiles));
                Some(ScoredSession {
                    session_id: session.session_id,
                    features,
                    signature,
                })
            })
            .collect();

        let behavioral_result = behavioral::analyze(&scored);
        self.store.persist_behavioral_result(&behavioral_result, analysis_id)?;

        let feature_list: Vec<_> = scored.iter().map(|s| s.features.clone()).collect();
        let security_report = relayscope_engine::security::assess(&feature_list, Some(&behavioral_result));
        let findings_count = self.store.persist_security_checks(&security_report.checks, analysis_id)?;

        let session_ids: Vec<String> = scored.iter().map(|s| s.session_id.clone()).collect();
        self.store.mark_sessions_analyzed(&session_ids, analysis_id)?;

        let risk_score = Some(1.0 - behavioral_result.stability_score * behavioral_result.predictability_score);
        Ok((session_ids, findings_count as u64, risk_score))
    }

    /// Startup recovery scan: finds every agent that crossed the
    /// eligibility bound while the process was not running (e.g. a
    /// session completed just before a restart) and triggers each.
    pub fn recover(&self) -> Result<usize> {
        let candidates = self.store.agents_with_unanalyzed_sessions(self.min_sessions)?;
        let mut triggered = 0;
        for system_prompt_id in candidates {
            if self.trigger(&system_prompt_id)?.is_some() {
                triggered += 1;
            }
        }
        Ok(triggered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relayscope_types::{Event, EventName, Session};
    use std::sync::Arc;

    fn store_with_agent(min_sessions: u64) -> (Arc<Store>, String) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let system_prompt_id = "sp1".to_string();
        let now = Utc::now();
        for i in 0..min_sessions {
            let session_id = format!("s{i}");
            let mut event = Event::new(EventName::LlmCallStart, session_id.clone(), 0, now);
            event = event.with_agent(None, Some(system_prompt_id.clone()));
            store.add_event(&event, Some(&system_prompt_id), 10_000).unwrap();
        }
        let completed = store.check_and_complete_sessions(now + chrono::Duration::seconds(60), 30).unwrap();
        for session_id in completed {
            let session: Session = store.get_session(&session_id).unwrap().unwrap();
            let features = relayscope_engine::features::extract(&session);
            let signature = behavioral::compute_signature(&features, &Default::default());
            store.complete_session(&session_id, &signature, &features).unwrap();
        }
        (store, system_prompt_id)
    }

    #[test]
    fn should_run_is_false_below_the_minimum() {
        let (store, system_prompt_id) = store_with_agent(2);
        let runner = AnalysisRunner::new(store, MIN_SESSIONS_FOR_RISK_ANALYSIS);
        assert!(!runner.should_run(&system_prompt_id).unwrap());
    }

    #[test]
    fn should_run_is_true_once_unanalyzed_sessions_cross_the_minimum() {
        let (store, system_prompt_id) = store_with_agent(5);
        let runner = AnalysisRunner::new(store, MIN_SESSIONS_FOR_RISK_ANALYSIS);
        assert!(runner.should_run(&system_prompt_id).unwrap());
    }

    #[test]
    fn run_once_completes_the_analysis_session_and_clears_the_watermark() {
        let (store, system_prompt_id) = store_with_agent(5);
        let runner = AnalysisRunner::new(store.clone(), MIN_SESSIONS_FOR_RISK_ANALYSIS);
        let analysis = runner.run_once(&system_prompt_id).unwrap();
        assert_eq!(analysis.status, relayscope_types::AnalysisStatus::Completed);
        assert!(!runner.should_run(&system_prompt_id).unwrap());
    }

    #[test]
    fn trigger_is_a_noop_for_an_unknown_agent() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let runner = AnalysisRunner::new(store, MIN_SESSIONS_FOR_RISK_ANALYSIS);
        assert!(runner.trigger("nonexistent").unwrap().is_none());
    }

    #[test]
    fn recover_triggers_every_eligible_agent() {
        let (store, system_prompt_id) = store_with_agent(5);
        let runner = AnalysisRunner::new(store, MIN_SESSIONS_FOR_RISK_ANALYSIS);
        let triggered = runner.recover().unwrap();
        assert_eq!(triggered, 1);
        assert!(!runner.should_run(&system_prompt_id).unwrap());
    }
}
