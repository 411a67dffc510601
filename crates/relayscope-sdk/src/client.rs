use std::sync::Arc;

use chrono::Utc;
use relayscope_providers::ProviderRegistry;
use relayscope_runtime::{AnalysisRunner, Config, SessionMonitor};
use relayscope_store::Store;
use relayscope_types::{Agent, AnalysisSession, Event, Finding, FindingStatus, Session};

use crate::error::{Error, Result};

/// Facade wiring a [`Store`], the provider [`ProviderRegistry`], and an
/// [`AnalysisRunner`] together behind one handle. Cheap to clone: everything
/// behind it is already `Arc`-shared.
#[derive(Clone)]
pub struct Client {
    store: Arc<Store>,
    runner: Arc<AnalysisRunner>,
    providers: Arc<ProviderRegistry>,
    config: Config,
}

impl Client {
    /// Opens (or creates) the store at the path resolved from `config`.
    pub fn connect(config: Config) -> Result<Self> {
        let store = Arc::new(Store::open(&config.resolved_db_path()?)?);
        let runner = Arc::new(AnalysisRunner::new(store.clone(), config.min_sessions_for_analysis));
        Ok(Self {
            store,
            runner,
            providers: Arc::new(ProviderRegistry::new()),
            config,
        })
    }

    /// Loads configuration from the default path (or its built-in
    /// defaults if absent) and connects.
    pub fn connect_default() -> Result<Self> {
        Self::connect(Config::load()?)
    }

    /// An in-memory store with default configuration, for tests and
    /// short-lived embeddings that don't want a file on disk.
    pub fn open_in_memory() -> Result<Self> {
        let config = Config::default();
        let store = Arc::new(Store::open_in_memory()?);
        let runner = Arc::new(AnalysisRunner::new(store.clone(), config.min_sessions_for_analysis));
        Ok(Self {
            store,
            runner,
            providers: Arc::new(ProviderRegistry::new()),
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn sessions(&self) -> SessionsClient {
        SessionsClient { store: self.store.clone() }
    }

    pub fn agents(&self) -> AgentsClient {
        AgentsClient { store: self.store.clone() }
    }

    pub fn findings(&self) -> FindingsClient {
        FindingsClient { store: self.store.clone() }
    }

    pub fn analysis(&self) -> AnalysisClient {
        AnalysisClient { runner: self.runner.clone() }
    }

    /// Records one ingested event, bumping the owning session's activity
    /// clock and rolling window, per the configured `max_events_per_session`.
    pub fn record_event(&self, event: &Event, system_prompt_id: Option<&str>) -> Result<()> {
        Ok(self.store.add_event(event, system_prompt_id, self.config.max_events_per_session)?)
    }

    /// Runs one session-monitor tick synchronously: completes idle
    /// sessions, freezes their signatures, and triggers analysis for any
    /// agent that crossed the threshold. Used by the CLI's `doctor` command
    /// and by tests that don't want a background thread.
    pub fn tick(&self) -> Result<()> {
        Ok(relayscope_runtime::monitor::run_once(&self.store, &self.runner, self.config.session_timeout_secs)?)
    }

    /// Spawns the dedicated background thread that ticks on
    /// `config.monitor_interval_secs`. The returned handle stops the
    /// thread when dropped.
    pub fn start_background_workers(&self) -> SessionMonitor {
        SessionMonitor::spawn(
            self.store.clone(),
            self.runner.clone(),
            std::time::Duration::from_secs(self.config.monitor_interval_secs),
            self.config.session_timeout_secs,
        )
    }
}

pub struct SessionsClient {
    store: Arc<Store>,
}

impl SessionsClient {
    pub fn get(&self, session_id: &str) -> Result<Session> {
        self.store
            .get_session(session_id)?
            .ok_or_else(|| Error::NotFound(format!("session {session_id}")))
    }

    pub fn list_recent(&self, system_prompt_id: Option<&str>, limit: usize) -> Result<Vec<Session>> {
        Ok(self.store.list_recent_sessions(system_prompt_id, limit)?)
    }

    pub fn completed_for_agent(&self, system_prompt_id: &str) -> Result<Vec<Session>> {
        Ok(self.store.snapshot_agent_sessions(system_prompt_id)?)
    }
}

pub struct AgentsClient {
    store: Arc<Store>,
}

impl AgentsClient {
    pub fn get(&self, system_prompt_id: &str) -> Result<Agent> {
        self.store
            .get_agent(system_prompt_id)?
            .ok_or_else(|| Error::NotFound(format!("agent {system_prompt_id}")))
    }

    pub fn list(&self) -> Result<Vec<Agent>> {
        Ok(self.store.list_agents()?)
    }
}

pub struct FindingsClient {
    store: Arc<Store>,
}

impl FindingsClient {
    pub fn get(&self, finding_id: &str) -> Result<Finding> {
        self.store
            .get_finding(finding_id)?
            .ok_or_else(|| Error::NotFound(format!("finding {finding_id}")))
    }

    pub fn list(&self, status: Option<FindingStatus>) -> Result<Vec<Finding>> {
        Ok(self.store.list_findings(status)?)
    }

    pub fn for_analysis(&self, analysis_session_id: &str) -> Result<Vec<Finding>> {
        Ok(self.store.list_findings_for_analysis(analysis_session_id)?)
    }

    pub fn for_agent(&self, agent_id: &str) -> Result<Vec<Finding>> {
        Ok(self.store.list_findings_for_agent(agent_id)?)
    }

    pub fn create_or_refresh(&self, finding: &Finding) -> Result<Finding> {
        Ok(self.store.create_or_refresh_finding(finding)?)
    }

    pub fn update_status(&self, finding_id: &str, status: FindingStatus, note: Option<&str>) -> Result<Finding> {
        Ok(self.store.update_finding_status(finding_id, status, note, Utc::now())?)
    }
}

pub struct AnalysisClient {
    runner: Arc<AnalysisRunner>,
}

impl AnalysisClient {
    /// Triggers an analysis run for `system_prompt_id` if it is due;
    /// returns `None` if it already has no unanalyzed sessions.
    pub fn trigger(&self, system_prompt_id: &str) -> Result<Option<AnalysisSession>> {
        Ok(self.runner.trigger(system_prompt_id)?)
    }

    pub fn should_run(&self, system_prompt_id: &str) -> Result<bool> {
        Ok(self.runner.should_run(system_prompt_id)?)
    }

    /// Startup recovery scan over every agent that crossed the eligibility
    /// bound while the process was not running.
    pub fn recover(&self) -> Result<usize> {
        Ok(self.runner.recover()?)
    }
}

/// Attaches a record of this connection's liveness to the given IDE
/// session, mirroring the heartbeat the dashboard's IDE integrations send.
pub fn touch_ide_connection(client: &Client, connection_id: &str, session_id: Option<&str>, ide_name: &str) -> Result<()> {
    Ok(client.store().upsert_ide_connection(connection_id, session_id, ide_name, Utc::now())?)
}
