//! TestWorld pattern for declarative integration test setup.
//!
//! Provides a fluent interface for:
//! - Creating an isolated workspace directory
//! - Connecting an in-process [`relayscope_sdk::Client`] against it
//! - Running the `relayscope` binary against the same workspace

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Result;
use assert_cmd::Command;
use relayscope_runtime::Config;
use relayscope_sdk::Client;
use tempfile::TempDir;

/// Builder for constructing [`TestWorld`] with fine-grained control.
///
/// # Example
/// ```no_run
/// use relayscope_testing::TestWorld;
///
/// let world = TestWorld::builder().without_workspace_dir().build();
/// assert!(!world.assert_database_exists());
/// ```
pub struct TestWorldBuilder {
    skip_workspace_creation: bool,
    env_vars: HashMap<String, String>,
}

impl TestWorldBuilder {
    pub fn new() -> Self {
        Self {
            skip_workspace_creation: false,
            env_vars: HashMap::new(),
        }
    }

    /// Skip automatic creation of the workspace directory, for testing
    /// fresh-install scenarios where it does not exist yet.
    pub fn without_workspace_dir(mut self) -> Self {
        self.skip_workspace_creation = true;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> TestWorld {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let workspace_dir = temp_dir.path().join(".relayscope");

        if !self.skip_workspace_creation {
            std::fs::create_dir_all(&workspace_dir).expect("failed to create workspace dir");
        }

        TestWorld {
            temp_dir,
            workspace_dir,
            env_vars: self.env_vars,
        }
    }
}

impl Default for TestWorldBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Declarative test environment: an isolated workspace directory, reachable
/// either through an in-process [`Client`] or through the `relayscope`
/// binary run as a subprocess against the same directory.
///
/// # Example
/// ```no_run
/// use relayscope_testing::TestWorld;
///
/// let world = TestWorld::new();
/// let client = world.client().unwrap();
/// assert!(client.agents().list().unwrap().is_empty());
/// ```
pub struct TestWorld {
    temp_dir: TempDir,
    workspace_dir: PathBuf,
    env_vars: HashMap<String, String>,
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorld {
    pub fn builder() -> TestWorldBuilder {
        TestWorldBuilder::new()
    }

    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir
    }

    pub fn temp_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The `Config` this world's workspace resolves to.
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.workspace_path = Some(self.workspace_dir.to_string_lossy().into_owned());
        config
    }

    /// Connects an in-process [`Client`] against this world's workspace,
    /// the preferred way to set up fixture state for a test without going
    /// through the proxy's HTTP surface.
    pub fn client(&self) -> Result<Client> {
        Ok(Client::connect(self.config())?)
    }

    pub fn remove_config(&self) -> Result<()> {
        let config_path = self.workspace_dir.join("config.toml");
        if config_path.exists() {
            std::fs::remove_file(config_path)?;
        }
        Ok(())
    }

    pub fn remove_database(&self) -> Result<()> {
        let db_path = self.workspace_dir.join("trace.sqlite3");
        if db_path.exists() {
            std::fs::remove_file(db_path)?;
        }
        Ok(())
    }

    pub fn write_raw_config(&self, content: &str) -> Result<()> {
        if !self.workspace_dir.exists() {
            std::fs::create_dir_all(&self.workspace_dir)?;
        }
        std::fs::write(self.workspace_dir.join("config.toml"), content)?;
        Ok(())
    }

    pub fn assert_database_exists(&self) -> bool {
        self.workspace_dir.join("trace.sqlite3").exists()
    }

    pub fn assert_config_exists(&self) -> bool {
        self.workspace_dir.join("config.toml").exists()
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(key.into(), value.into());
        self
    }

    /// Configures a `relayscope` [`Command`] to point at this world's
    /// workspace, with plain-text output for easy stdout assertions.
    pub fn configure_command<'a>(&self, cmd: &'a mut Command) -> &'a mut Command {
        cmd.arg("--workspace").arg(&self.workspace_dir).arg("--format").arg("plain");
        for (key, value) in &self.env_vars {
            cmd.env(key, value);
        }
        cmd
    }

    /// Runs `relayscope <args>` against this world's workspace and captures
    /// the result. Requires the binary to be built (`cargo test` sets
    /// `CARGO_BIN_EXE_relayscope` automatically).
    pub fn run(&self, args: &[&str]) -> Result<CliResult> {
        let mut cmd = Command::cargo_bin("relayscope").map_err(|e| anyhow::anyhow!("failed to find relayscope binary: {e}"))?;
        self.configure_command(&mut cmd);
        cmd.args(args);
        let output = cmd.output()?;
        Ok(CliResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

/// Result of a `relayscope` command-line invocation.
#[derive(Debug)]
pub struct CliResult {
    pub status: std::process::ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CliResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn json(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.stdout)?)
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_world_has_no_database_until_one_is_created() {
        let world = TestWorld::new();
        assert!(!world.assert_database_exists());
        let client = world.client().unwrap();
        assert!(client.agents().list().unwrap().is_empty());
    }

    #[test]
    fn without_workspace_dir_skips_directory_creation() {
        let world = TestWorld::builder().without_workspace_dir().build();
        assert!(!world.workspace_dir().exists());
    }

    #[test]
    fn write_raw_config_creates_the_workspace_dir_if_missing() {
        let world = TestWorld::builder().without_workspace_dir().build();
        world.write_raw_config("bind_addr = \"127.0.0.1:9999\"\n").unwrap();
        assert!(world.assert_config_exists());
    }
}
