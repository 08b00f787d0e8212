//! Service context shared by every operation.
//!
//! Built once at process start and passed to handlers; nothing in the
//! crate keeps module-level mutable state.

use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::orchestrator::lifecycle::SessionLifecycle;
use crate::orchestrator::locks::ProjectLocks;
use crate::orchestrator::registry::SessionRegistry;
use crate::persistence::db::Database;
use crate::persistence::project_repo::ProjectRepo;
use crate::worker::WorkerDirectory;

/// Shared infrastructure for the external operations.
#[derive(Clone)]
pub struct ServiceContext {
    /// Global configuration.
    pub config: Arc<GlobalConfig>,
    /// `SQLite` connection pool.
    pub db: Arc<Database>,
    /// Per-project serialization.
    pub locks: ProjectLocks,
    /// Live sessions keyed by project id.
    pub registry: SessionRegistry,
    /// Worker stubs registered on this node.
    pub directory: WorkerDirectory,
    /// Session start and teardown.
    pub lifecycle: SessionLifecycle,
}

impl ServiceContext {
    /// Wire a context around a loaded configuration and an open pool.
    #[must_use]
    pub fn new(config: Arc<GlobalConfig>, db: Arc<Database>) -> Self {
        let registry = SessionRegistry::default();
        let directory = WorkerDirectory::default();
        let lifecycle = SessionLifecycle::new(
            Arc::clone(&config),
            ProjectRepo::new(Arc::clone(&db)),
            registry.clone(),
            directory.clone(),
        );
        Self {
            config,
            db,
            locks: ProjectLocks::default(),
            registry,
            directory,
            lifecycle,
        }
    }

    /// Record store over the shared pool.
    #[must_use]
    pub fn projects(&self) -> ProjectRepo {
        ProjectRepo::new(Arc::clone(&self.db))
    }
}
