//! Process-wide directory of worker stubs.
//!
//! Stubs register here on creation so peers on this node can resolve
//! them by id; termination detaches the stub before anything else is
//! torn down.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use crate::{AppError, Result};

/// Shared set of registered worker ids.
#[derive(Debug, Clone, Default)]
pub struct WorkerDirectory {
    workers: Arc<Mutex<BTreeSet<String>>>,
}

impl WorkerDirectory {
    /// Register a worker id; returns `false` if it was already present.
    pub fn register(&self, worker_id: &str) -> bool {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(worker_id.to_owned())
    }

    /// Remove a worker id.
    ///
    /// # Errors
    ///
    /// Returns `AppError::NotFound` if the worker was not registered.
    pub fn remove(&self, worker_id: &str) -> Result<()> {
        let removed = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(worker_id);
        if removed {
            Ok(())
        } else {
            Err(AppError::NotFound(format!(
                "worker '{worker_id}' is not registered"
            )))
        }
    }

    /// Whether a worker id is registered.
    #[must_use]
    pub fn contains(&self, worker_id: &str) -> bool {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(worker_id)
    }

    /// Number of registered workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no workers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
