//! Process registry: in-memory map from project id to its live session.
//!
//! One coarse lock guards the whole map. Entries are created and removed
//! rarely, and nothing awaits while the lock is held. The registry is lost
//! on restart; see [`super::lifecycle::SessionLifecycle::reconcile_on_startup`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;

use crate::worker::{WorkerProcess, WorkerStub};
use crate::AppError;

/// One live session: the worker process and the stub reading its stdout.
///
/// The entry exclusively owns the process; the stub is reachable only
/// through the entry.
#[derive(Debug)]
pub struct SessionEntry {
    process: WorkerProcess,
    stub: WorkerStub,
}

impl SessionEntry {
    /// Pair a spawned process with its stub.
    #[must_use]
    pub fn new(process: WorkerProcess, stub: WorkerStub) -> Self {
        Self { process, stub }
    }

    /// OS process id of the worker.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    /// The worker stub.
    #[must_use]
    pub fn stub(&self) -> &WorkerStub {
        &self.stub
    }

    /// Split the entry for teardown.
    #[must_use]
    pub fn into_parts(self) -> (WorkerProcess, WorkerStub) {
        (self.process, self.stub)
    }
}

/// Introspection snapshot of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    /// Owning project.
    pub project_id: String,
    /// Directory id of the worker stub.
    pub worker_id: String,
    /// OS process id of the worker.
    pub pid: Option<u32>,
    /// Whether the stub's event loop is still running.
    pub loop_running: bool,
    /// Number of objects in the stub's data registry.
    pub objects: usize,
}

/// Rejected [`SessionRegistry::put`]: a session already exists.
///
/// Carries the rejected entry back so the caller can tear it down.
#[derive(Debug)]
pub struct Occupied {
    project_id: String,
    entry: SessionEntry,
}

impl Occupied {
    /// The entry that was not inserted.
    #[must_use]
    pub fn into_entry(self) -> SessionEntry {
        self.entry
    }

    /// The conflict surfaced to callers.
    #[must_use]
    pub fn error(&self) -> AppError {
        AppError::Conflict(format!(
            "project '{}' already has a live session",
            self.project_id
        ))
    }
}

/// Process-wide map of live sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    entries: Arc<Mutex<HashMap<String, SessionEntry>>>,
}

impl SessionRegistry {
    /// Insert an entry for `project_id`.
    ///
    /// # Errors
    ///
    /// Returns [`Occupied`] holding `entry` if the project already has one.
    pub fn put(&self, project_id: &str, entry: SessionEntry) -> std::result::Result<(), Occupied> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(project_id) {
            return Err(Occupied {
                project_id: project_id.to_owned(),
                entry,
            });
        }
        entries.insert(project_id.to_owned(), entry);
        Ok(())
    }

    /// Snapshot of the entry for `project_id`, if any.
    #[must_use]
    pub fn get(&self, project_id: &str) -> Option<SessionInfo> {
        self.with_entry(project_id, |entry| SessionInfo {
            project_id: project_id.to_owned(),
            worker_id: entry.stub.worker_id().to_owned(),
            pid: entry.pid(),
            loop_running: entry.stub.event_loop().is_running(),
            objects: entry.stub.data().len(),
        })
    }

    /// Run `f` against the entry for `project_id` while the lock is held.
    pub fn with_entry<T>(&self, project_id: &str, f: impl FnOnce(&SessionEntry) -> T) -> Option<T> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(project_id).map(f)
    }

    /// Whether `project_id` has a live entry.
    #[must_use]
    pub fn contains(&self, project_id: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(project_id)
    }

    /// Atomically detach and return the entry for `project_id`.
    #[must_use]
    pub fn remove(&self, project_id: &str) -> Option<SessionEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(project_id)
    }

    /// Project ids with live entries, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
