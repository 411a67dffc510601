use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn default_bind_addr() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_session_timeout_secs() -> i64 {
    30
}

fn default_monitor_interval_secs() -> u64 {
    5
}

fn default_min_sessions_for_analysis() -> u64 {
    5
}

fn default_max_events_per_session() -> usize {
    10_000
}

fn default_retention_minutes() -> i64 {
    24 * 60
}

fn default_pricing_cache_path() -> String {
    "pricing.json".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

/// Base URLs the proxy forwards to once it has stripped its own listening
/// prefix, one per adapter in [`relayscope_providers::ProviderRegistry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            openai_base_url: default_openai_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
        }
    }
}

/// Top-level configuration for the proxy server and its background
/// workers, loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Overrides the workspace data directory; falls through to
    /// `RELAYSCOPE_PATH` and the system data directory when unset.
    #[serde(default)]
    pub workspace_path: Option<String>,
    /// Overrides the SQLite store path; defaults to `<workspace>/trace.sqlite3`.
    #[serde(default)]
    pub db_path: Option<String>,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: i64,
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    #[serde(default = "default_min_sessions_for_analysis")]
    pub min_sessions_for_analysis: u64,
    #[serde(default = "default_max_events_per_session")]
    pub max_events_per_session: usize,
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: i64,
    /// Remote source for the daily pricing refresh; left unset, the pricing
    /// cache only ever falls back to its embedded defaults.
    #[serde(default)]
    pub pricing_url: Option<String>,
    /// Path to the pricing cache JSON file, relative to the workspace
    /// directory unless absolute.
    #[serde(default = "default_pricing_cache_path")]
    pub pricing_cache_path: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workspace_path: None,
            db_path: None,
            bind_addr: default_bind_addr(),
            upstream: UpstreamConfig::default(),
            session_timeout_secs: default_session_timeout_secs(),
            monitor_interval_secs: default_monitor_interval_secs(),
            min_sessions_for_analysis: default_min_sessions_for_analysis(),
            max_events_per_session: default_max_events_per_session(),
            retention_minutes: default_retention_minutes(),
            pricing_url: None,
            pricing_cache_path: default_pricing_cache_path(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(relayscope_core::resolve_workspace_path(None)?.join("config.toml"))
    }

    /// Resolves the SQLite store path: `db_path` if set, else the default
    /// under the (possibly overridden) workspace directory.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.db_path {
            return Ok(relayscope_core::expand_tilde(path));
        }
        Ok(relayscope_core::default_db_path(self.workspace_path.as_deref())?)
    }

    /// Resolves the pricing cache file path under the (possibly overridden)
    /// workspace directory, unless `pricing_cache_path` is itself absolute.
    pub fn resolved_pricing_cache_path(&self) -> Result<PathBuf> {
        let path = PathBuf::from(&self.pricing_cache_path);
        if path.is_absolute() {
            return Ok(path);
        }
        Ok(relayscope_core::resolve_workspace_path(self.workspace_path.as_deref())?.join(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_expected_bounds() {
        let config = Config::default();
        assert_eq!(config.bind_addr, "127.0.0.1:8787");
        assert_eq!(config.min_sessions_for_analysis, 5);
        assert_eq!(config.session_timeout_secs, 30);
    }

    #[test]
    fn save_then_load_round_trips() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config::default();
        config.bind_addr = "0.0.0.0:9000".to_string();
        config.upstream.openai_base_url = "https://proxy.example".to_string();
        config.save_to(&path)?;

        let loaded = Config::load_from(&path)?;
        assert_eq!(loaded.bind_addr, "0.0.0.0:9000");
        assert_eq!(loaded.upstream.openai_base_url, "https://proxy.example");
        Ok(())
    }

    #[test]
    fn load_nonexistent_returns_default() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let loaded = Config::load_from(&dir.path().join("missing.toml"))?;
        assert_eq!(loaded.bind_addr, default_bind_addr());
        Ok(())
    }

    #[test]
    fn resolved_db_path_prefers_explicit_override() {
        let mut config = Config::default();
        config.db_path = Some("/tmp/explicit.sqlite3".to_string());
        assert_eq!(config.resolved_db_path().unwrap(), PathBuf::from("/tmp/explicit.sqlite3"));
    }
}
