//! Per-project serialization of lifecycle transitions and record updates.
//!
//! Each project id maps to its own async mutex, so operations on
//! different projects proceed in parallel while operations on the same
//! project queue behind each other. A table entry lives only while some
//! caller holds or waits on it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type LockTable = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

/// Table of per-project locks.
#[derive(Debug, Clone, Default)]
pub struct ProjectLocks {
    locks: LockTable,
}

/// Proof that the lock for `project_id` is held.
///
/// Lifecycle operations take this guard instead of a bare project id.
/// Dropping the last guard for a project removes its table entry.
#[derive(Debug)]
pub struct ProjectGuard {
    project_id: String,
    table: LockTable,
    guard: OwnedMutexGuard<()>,
}

impl ProjectGuard {
    /// Project whose lock is held.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }
}

impl Drop for ProjectGuard {
    fn drop(&mut self) {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        // Waiters clone the mutex under the table lock, so a count of two
        // (table plus this guard) means nobody else is queued.
        if Arc::strong_count(OwnedMutexGuard::mutex(&self.guard)) == 2 {
            table.remove(&self.project_id);
        }
    }
}

impl ProjectLocks {
    /// Acquire the lock for `project_id`, waiting behind earlier holders.
    pub async fn acquire(&self, project_id: &str) -> ProjectGuard {
        let lock = {
            let mut table = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(table.entry(project_id.to_owned()).or_default())
        };

        ProjectGuard {
            project_id: project_id.to_owned(),
            table: Arc::clone(&self.locks),
            guard: lock.lock_owned().await,
        }
    }

    /// Number of projects whose lock is currently held or awaited.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether no project lock is held or awaited.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
