//! Background process management for the long-running `serve` subcommand.
//!
//! Provides utilities for:
//! - Starting `relayscope serve` in the background against a [`crate::TestWorld`]
//! - Reading its stdout/stderr while it runs
//! - Gracefully terminating it

use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::time::Duration;

/// A background process handle, killed automatically on drop so a failed
/// assertion never leaves a `relayscope serve` instance bound to the test
/// port.
pub struct BackgroundProcess {
    child: Child,
}

impl BackgroundProcess {
    /// Spawn a new background process.
    pub fn spawn(mut command: Command) -> std::io::Result<Self> {
        let child = command.spawn()?;
        Ok(Self { child })
    }

    /// Spawn a new background process with piped stdout and stderr, so its
    /// output can be read while it runs (e.g. waiting for the "listening"
    /// log line before issuing requests against it).
    pub fn spawn_piped(mut command: Command) -> std::io::Result<Self> {
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        let child = command.spawn()?;
        Ok(Self { child })
    }

    /// Wait for the process to exit, polling at a fixed interval, giving up
    /// after `timeout`.
    pub fn wait_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<std::process::ExitStatus>> {
        let start = std::time::Instant::now();
        loop {
            match self.child.try_wait()? {
                Some(status) => return Ok(Some(status)),
                None => {
                    if start.elapsed() > timeout {
                        return Ok(None);
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    /// Kill the process outright; used in teardown when the caller doesn't
    /// need to distinguish a clean exit from a forced one.
    pub fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill()
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Mutable access to the process's stdout, `None` unless spawned with
    /// [`Self::spawn_piped`].
    pub fn stdout(&mut self) -> Option<&mut ChildStdout> {
        self.child.stdout.as_mut()
    }

    /// Mutable access to the process's stderr, `None` unless spawned with
    /// [`Self::spawn_piped`].
    pub fn stderr(&mut self) -> Option<&mut ChildStderr> {
        self.child.stderr.as_mut()
    }
}

impl Drop for BackgroundProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_and_kill_a_sleep_process() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let mut process = BackgroundProcess::spawn(cmd).unwrap();
        process.kill().unwrap();
        let status = process.wait_timeout(Duration::from_secs(5)).unwrap();
        assert!(status.is_some());
    }
}
