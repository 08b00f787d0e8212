//! Session lifecycle: start, ordered two-phase teardown, reconciliation.
//!
//! The process registry is the source of truth for whether a worker is
//! live; the record's `is_live` flag is a projection that only this module
//! writes. Every method requires the project's [`ProjectGuard`].
//!
//! Termination runs in strict order:
//!
//! 1. remove the entry from the registry (`NotFound` if absent)
//! 2. detach the stub from the worker directory (best effort)
//! 3. stop, then close, the stub's event loop
//! 4. signal the worker process, join it, release it
//! 5. clear `is_live` on the record
//!
//! Steps 2 to 4 never prevent step 5. Steps 2 to 5 run on a spawned task
//! so a dropped caller cannot abandon a half-finished teardown.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::models::combination::CombinationKey;
use crate::models::project::{ProjectRecord, SessionState};
use crate::persistence::project_repo::ProjectRepo;
use crate::worker::{WorkerDirectory, WorkerProcess, WorkerStub};
use crate::{AppError, Result};

use super::locks::{ProjectGuard, ProjectLocks};
use super::registry::{SessionEntry, SessionRegistry};

/// Outcome of steps 2 to 4 of a teardown.
#[derive(Debug, Default)]
struct TeardownReport {
    failures: Vec<String>,
    exit_code: Option<i32>,
}

impl TeardownReport {
    fn into_result(self) -> Result<()> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(AppError::ResourceTeardown(self.failures.join("; ")))
        }
    }
}

/// Owns session start and teardown, keeping the registry and the record
/// store in lock-step.
#[derive(Clone)]
pub struct SessionLifecycle {
    config: Arc<GlobalConfig>,
    projects: ProjectRepo,
    registry: SessionRegistry,
    directory: WorkerDirectory,
}

impl SessionLifecycle {
    /// Create a lifecycle manager over shared infrastructure.
    #[must_use]
    pub fn new(
        config: Arc<GlobalConfig>,
        projects: ProjectRepo,
        registry: SessionRegistry,
        directory: WorkerDirectory,
    ) -> Self {
        Self {
            config,
            projects,
            registry,
            directory,
        }
    }

    /// The process registry this manager writes to.
    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Directory id for a project's worker stub on this node.
    #[must_use]
    pub fn worker_id(&self, project_id: &str) -> String {
        format!("{}/{project_id}", self.config.node_id)
    }

    /// Start a session: spawn the worker, register it, mark the record live.
    ///
    /// Valid from `UNINITIALISED` and `TERMINATED`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the project is not registered,
    /// `AppError::Conflict` if a session is already live,
    /// `AppError::Worker` if the spawn fails, or the record store error if
    /// marking the record live fails (the spawned worker is torn down
    /// first).
    pub async fn start(&self, guard: &ProjectGuard) -> Result<ProjectRecord> {
        let project_id = guard.project_id();
        let span = info_span!("session_start", project_id);

        async {
            let record = self.projects.get(project_id).await?;
            let state = record.session_state();
            if self.registry.contains(project_id) || !state.can_transition_to(SessionState::Live) {
                return Err(AppError::Conflict(format!(
                    "project '{project_id}' already has a live session"
                )));
            }

            let (process, stdout) = WorkerProcess::spawn(&self.config, project_id)?;
            let stub = WorkerStub::start(self.worker_id(project_id), stdout, self.directory.clone());
            let pid = process.pid();

            if let Err(occupied) = self.registry.put(project_id, SessionEntry::new(process, stub)) {
                let err = occupied.error();
                self.discard(project_id, occupied.into_entry()).await;
                return Err(err);
            }

            let mut fields = record.fields;
            fields.is_live = true;
            match self.projects.update(project_id, &fields).await {
                Ok(updated) => {
                    info!(project_id, pid, "session started");
                    Ok(updated)
                }
                Err(err) => {
                    error!(project_id, pid, %err, "failed to mark session live, tearing down worker");
                    if let Some(entry) = self.registry.remove(project_id) {
                        self.discard(project_id, entry).await;
                    }
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Terminate the project's live session.
    ///
    /// `retire` names a combination key to drop from `in_progress` in the
    /// same record update that clears `is_live`. The guard is held until
    /// the teardown completes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if no session is live (the record is
    /// untouched), the record store error if step 5 fails, or
    /// `AppError::ResourceTeardown` if the loop or process would not stop
    /// (the record is still updated).
    pub async fn terminate(
        &self,
        guard: ProjectGuard,
        retire: Option<&CombinationKey>,
    ) -> Result<ProjectRecord> {
        let project_id = guard.project_id().to_owned();
        let span = info_span!("session_terminate", project_id = project_id.as_str());

        let entry = self.registry.remove(&project_id).ok_or_else(|| {
            AppError::NotFound(format!("project '{project_id}' has no live session"))
        })?;

        let projects = self.projects.clone();
        let stop_timeout = self.config.worker.stop_timeout();
        let join_timeout = self.config.worker.join_timeout();
        let retire = retire.cloned();

        let task = tokio::spawn(
            async move {
                let _guard = guard;
                let pid = entry.pid();
                let report = teardown(&project_id, entry, stop_timeout, join_timeout).await;

                let mut fields = projects.get(&project_id).await?.fields;
                fields.is_live = false;
                fields.terminated_at = Some(Utc::now());
                if let Some(key) = &retire {
                    fields.in_progress.remove(key.as_str());
                }
                let updated = projects.update(&project_id, &fields).await.inspect_err(|err| {
                    error!(%project_id, pid, %err, "failed to clear liveness after teardown");
                })?;

                let exit_code = report.exit_code;
                report.into_result().inspect_err(|err| {
                    error!(%project_id, pid, exit_code, %err, "session teardown incomplete");
                })?;

                info!(%project_id, pid, exit_code, "session terminated");
                Ok::<_, AppError>(updated)
            }
            .instrument(span),
        );

        task.await
            .map_err(|err| AppError::ResourceTeardown(format!("teardown task failed: {err}")))?
    }

    /// Reset records left live by a previous run of the node.
    ///
    /// The registry is empty at boot, so any live record is stale.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if listing or updating records fails.
    pub async fn reconcile_on_startup(&self, locks: &ProjectLocks) -> Result<usize> {
        let mut reset = 0;
        for record in self.projects.list_live().await? {
            let project_id = record.project_id.as_str();
            let _guard = locks.acquire(project_id).await;
            if self.registry.contains(project_id) {
                continue;
            }

            let mut fields = record.fields;
            fields.is_live = false;
            fields.terminated_at = Some(Utc::now());
            self.projects.update(project_id, &fields).await?;
            warn!(project_id, "reset stale live session from previous run");
            reset += 1;
        }
        Ok(reset)
    }

    /// Terminate every live session; used on shutdown.
    ///
    /// Failures are logged and do not stop the sweep. Returns the number of
    /// sessions whose record was cleanly updated.
    pub async fn terminate_all(&self, locks: &ProjectLocks) -> usize {
        let mut terminated = 0;
        for project_id in self.registry.ids() {
            let guard = locks.acquire(&project_id).await;
            match self.terminate(guard, None).await {
                Ok(_) => terminated += 1,
                Err(AppError::NotFound(_)) => {}
                Err(err) => error!(%project_id, %err, "failed to terminate session on shutdown"),
            }
        }
        terminated
    }

    async fn discard(&self, project_id: &str, entry: SessionEntry) {
        let report = teardown(
            project_id,
            entry,
            self.config.worker.stop_timeout(),
            self.config.worker.join_timeout(),
        )
        .await;
        if let Err(err) = report.into_result() {
            error!(project_id, %err, "failed to discard worker");
        }
    }
}

/// Steps 2 to 4 of termination over an entry already removed from the
/// registry.
async fn teardown(
    project_id: &str,
    entry: SessionEntry,
    stop_timeout: Duration,
    join_timeout: Duration,
) -> TeardownReport {
    let mut report = TeardownReport::default();
    let (mut process, mut stub) = entry.into_parts();
    let pid = process.pid();

    if let Err(err) = stub.detach() {
        warn!(project_id, pid, %err, "failed to detach worker stub");
    }

    close_event_loop(project_id, pid, &mut stub, stop_timeout, &mut report).await;
    stop_process(project_id, &mut process, join_timeout, &mut report).await;

    drop(process);
    report
}

async fn close_event_loop(
    project_id: &str,
    pid: Option<u32>,
    stub: &mut WorkerStub,
    stop_timeout: Duration,
    report: &mut TeardownReport,
) {
    let event_loop = stub.event_loop_mut();
    if !event_loop.is_running() {
        // Already finished; reap the task handle.
        if let Err(err) = event_loop.close(stop_timeout).await {
            warn!(project_id, pid, %err, "finished event loop ended abnormally");
        }
        return;
    }

    event_loop.stop();
    if let Err(err) = event_loop.close(stop_timeout).await {
        error!(project_id, pid, %err, "event loop did not close");
        report.failures.push(err.to_string());
    }
    if event_loop.is_running() {
        report
            .failures
            .push(format!("event loop for '{project_id}' still running after close"));
    }
}

async fn stop_process(
    project_id: &str,
    process: &mut WorkerProcess,
    join_timeout: Duration,
    report: &mut TeardownReport,
) {
    let pid = process.pid();
    match process.is_alive() {
        Ok(true) => {}
        Ok(false) => {
            if let Ok(status) = process.join(join_timeout).await {
                report.exit_code = status.code();
            }
            return;
        }
        Err(err) => {
            error!(project_id, pid, %err, "cannot poll worker process");
            report.failures.push(err.to_string());
            return;
        }
    }

    if let Err(err) = process.signal_terminate() {
        warn!(project_id, pid, %err, "failed to signal worker");
    }

    match process.join(join_timeout).await {
        Ok(status) => {
            report.exit_code = status.code();
            info!(project_id, pid, exit_code = report.exit_code, "worker process exited");
        }
        Err(err) => {
            error!(project_id, pid, %err, "worker process did not exit, forcing kill");
            report.failures.push(err.to_string());
            process.force_kill();
            if let Ok(status) = process.join(join_timeout).await {
                report.exit_code = status.code();
            }
        }
    }

    match process.is_alive() {
        Ok(false) => {}
        Ok(true) => report
            .failures
            .push(format!("worker pid {} still alive after join", pid.unwrap_or(0))),
        Err(err) => report.failures.push(err.to_string()),
    }
}
