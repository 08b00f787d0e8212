//! Worker process spawner and OS-level controls.
//!
//! Spawns the configured worker binary for a project with
//! `kill_on_drop(true)`, so a handle dropped on any error path never leaves
//! an orphaned process. The project and node identity plus the compute
//! allocation are passed through the environment.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, ChildStdout, Command};
use tracing::{info, warn};

use crate::config::GlobalConfig;
use crate::{AppError, Result};

/// Exclusively owned handle to one worker process.
#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
    pid: Option<u32>,
}

impl WorkerProcess {
    /// Spawn the worker binary for `project_id` and capture its stdout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Worker` if the process cannot be spawned or its
    /// stdout cannot be captured.
    pub fn spawn(config: &GlobalConfig, project_id: &str) -> Result<(Self, ChildStdout)> {
        let mut cmd = Command::new(&config.worker.program);
        cmd.args(&config.worker.args)
            .env("FL_NODE_ID", &config.node_id)
            .env("FL_PROJECT_ID", project_id)
            .env("FL_OUT_DIR", &config.out_dir)
            .env("FL_CORES", config.resources.cores_used().to_string())
            .env("FL_GPUS", config.resources.gpus_used().to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|err| {
            AppError::Worker(format!(
                "failed to spawn worker '{}': {err}",
                config.worker.program
            ))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Worker("failed to capture worker stdout".into()))?;

        let pid = child.id();
        let program = config.log_path(Path::new(&config.worker.program));
        info!(project_id, pid, %program, "worker process spawned");

        Ok((Self { child, pid }, stdout))
    }

    /// OS process id captured at spawn time.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the process has not yet exited.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Worker` if the process status cannot be polled.
    pub fn is_alive(&mut self) -> Result<bool> {
        self.child
            .try_wait()
            .map(|status| status.is_none())
            .map_err(|err| AppError::Worker(format!("failed to poll worker status: {err}")))
    }

    /// Ask the process to terminate (`SIGTERM` on Unix).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Worker` if the signal cannot be delivered.
    #[cfg(unix)]
    pub fn signal_terminate(&mut self) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let raw = i32::try_from(pid)
            .map_err(|_| AppError::Worker(format!("pid {pid} out of range")))?;
        kill(Pid::from_raw(raw), Signal::SIGTERM)
            .map_err(|err| AppError::Worker(format!("failed to signal pid {pid}: {err}")))
    }

    /// Ask the process to terminate.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Worker` if the kill request fails.
    #[cfg(not(unix))]
    pub fn signal_terminate(&mut self) -> Result<()> {
        self.child
            .start_kill()
            .map_err(|err| AppError::Worker(format!("failed to terminate worker: {err}")))
    }

    /// Wait for the process to exit, bounded by `limit`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ResourceTeardown` if the process is still running
    /// after `limit`, or `AppError::Worker` if waiting fails.
    pub async fn join(&mut self, limit: Duration) -> Result<ExitStatus> {
        match tokio::time::timeout(limit, self.child.wait()).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(err)) => Err(AppError::Worker(format!("failed to wait for worker: {err}"))),
            Err(_elapsed) => Err(AppError::ResourceTeardown(format!(
                "worker pid {} did not exit within {limit:?}",
                self.pid.unwrap_or(0)
            ))),
        }
    }

    /// Force-kill the process without waiting.
    pub fn force_kill(&mut self) {
        if let Err(err) = self.child.start_kill() {
            warn!(pid = self.pid, %err, "failed to force-kill worker");
        }
    }
}
