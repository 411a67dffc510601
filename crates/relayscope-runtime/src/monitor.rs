use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::Utc;
use relayscope_store::Store;
use tracing::{error, warn};

use crate::analysis_runner::AnalysisRunner;
use crate::Result;

/// Polls the store for idle sessions on a dedicated background thread,
/// freezing their behavioral signature on completion and handing off to
/// the [`AnalysisRunner`].
pub struct SessionMonitor {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SessionMonitor {
    /// Spawns the monitor thread. `interval` is the poll period; sessions
    /// idle past `timeout_seconds` are marked completed on each tick.
    pub fn spawn(
        store: Arc<Store>,
        runner: Arc<AnalysisRunner>,
        interval: Duration,
        timeout_seconds: i64,
    ) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_signal = stop.clone();
        let handle = std::thread::Builder::new()
            .name("relayscope-session-monitor".to_string())
            .spawn(move || {
                while !stop_signal.load(Ordering::Relaxed) {
                    if let Err(err) = run_once(&store, &runner, timeout_seconds) {
                        error!(error = %err, "session monitor tick failed");
                    }
                    std::thread::sleep(interval);
                }
            })
            .expect("failed to spawn relayscope-session-monitor thread");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signals the thread to stop and waits for it to exit.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// One monitor tick: completes idle sessions, freezes their signature, and
/// triggers the analysis runner for each owning agent. Exposed standalone
/// so tests and the CLI's `doctor` command can run a tick synchronously
/// without spinning up a thread.
pub fn run_once(store: &Arc<Store>, runner: &Arc<AnalysisRunner>, timeout_seconds: i64) -> Result<()> {
    let newly_completed = store.check_and_complete_sessions(Utc::now(), timeout_seconds)?;
    let mut triggered = std::collections::HashSet::new();
    for session_id in newly_completed {
        match complete_one(store, &session_id) {
            Ok(Some(system_prompt_id)) => {
                triggered.insert(system_prompt_id);
            }
            Ok(None) => {}
            Err(err) => warn!(session_id = %session_id, error = %err, "failed to freeze session signature"),
        }
    }
    for system_prompt_id in triggered {
        if let Err(err) = runner.trigger(&system_prompt_id) {
            warn!(system_prompt_id = %system_prompt_id, error = %err, "analysis run failed");
        }
    }
    Ok(())
}

/// Extracts features for a just-completed session, computes its MinHash
/// signature against the owning agent's frozen percentiles (or the
/// all-zero default if the agent hasn't crossed the freeze threshold yet),
/// and persists both. Returns the owning agent's id so the caller can
/// decide whether to trigger analysis.
fn complete_one(store: &Arc<Store>, session_id: &str) -> Result<Option<String>> {
    let Some(session) = store.get_session(session_id)? else {
        return Ok(None);
    };
    let features = relayscope_engine::features::extract(&session);
    let percentiles = match &session.system_prompt_id {
        Some(system_prompt_id) => store
            .get_agent(system_prompt_id)?
            .and_then(|agent| agent.frozen_percentiles)
            .unwrap_or_default(),
        None => Default::default(),
    };
    let signature = relayscope_engine::behavioral::compute_signature(&features, &percentiles);
    store.complete_session(session_id, &signature, &features)?;
    Ok(session.system_prompt_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relayscope_types::{Event, EventName};

    fn seeded_store() -> (Arc<Store>, String) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let system_prompt_id = "sp1".to_string();
        let now = Utc::now();
        let mut event = Event::new(EventName::LlmCallStart, "s1".to_string(), 0, now);
        event = event.with_agent(None, Some(system_prompt_id.clone()));
        store.add_event(&event, Some(&system_prompt_id), 10_000).unwrap();
        (store, system_prompt_id)
    }

    #[test]
    fn run_once_freezes_an_idle_session_and_triggers_the_runner() {
        let (store, system_prompt_id) = seeded_store();
        let runner = Arc::new(AnalysisRunner::new(store.clone(), 1));

        // Nothing is idle yet.
        run_once(&store, &runner, 3_600).unwrap();
        let session = store.get_session("s1").unwrap().unwrap();
        assert!(!session.is_completed);

        // Advance past the timeout by completing directly, as the real
        // tick would once `last_activity` ages out.
        let completed = store
            .check_and_complete_sessions(Utc::now() + chrono::Duration::seconds(7_200), 3_600)
            .unwrap();
        assert_eq!(completed, vec!["s1".to_string()]);

        let owner = complete_one(&store, "s1").unwrap();
        assert_eq!(owner.as_deref(), Some(system_prompt_id.as_str()));
        let session = store.get_session("s1").unwrap().unwrap();
        assert!(session.signature.is_some());
        assert!(session.features.is_some());
    }

    #[test]
    fn complete_one_is_a_noop_for_a_missing_session() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        assert_eq!(complete_one(&store, "ghost").unwrap(), None);
    }

    #[test]
    fn spawn_and_stop_joins_cleanly() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let runner = Arc::new(AnalysisRunner::new(store.clone(), 5));
        let monitor = SessionMonitor::spawn(store, runner, Duration::from_millis(5), 3_600);
        std::thread::sleep(Duration::from_millis(20));
        monitor.stop();
    }
}
