//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

use crate::{AppError, Result};

/// Settings for the background worker process spawned per project.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    /// Worker binary launched for each live session.
    pub program: String,
    /// Arguments passed to the worker binary.
    #[serde(default)]
    pub args: Vec<String>,
    /// Bound on closing the stub's event loop once a stop is scheduled.
    #[serde(default = "default_stop_timeout")]
    pub stop_timeout_seconds: u64,
    /// Bound on waiting for the worker process to exit after termination.
    #[serde(default = "default_join_timeout")]
    pub join_timeout_seconds: u64,
}

fn default_stop_timeout() -> u64 {
    5
}

fn default_join_timeout() -> u64 {
    30
}

impl WorkerConfig {
    /// Event-loop close bound as a [`Duration`].
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_seconds)
    }

    /// Process-exit bound as a [`Duration`].
    #[must_use]
    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_seconds)
    }
}

/// Optional caps on the compute handed to worker processes.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ResourceConfig {
    /// Maximum CPU cores; defaults to all detected cores minus one.
    pub cpus: Option<usize>,
    /// Maximum GPUs; defaults to zero when unset.
    pub gpus: Option<usize>,
}

impl ResourceConfig {
    /// Cores granted to workers: the configured cap, never more than the
    /// detected count with one core held back for the node itself.
    #[must_use]
    pub fn cores_used(&self) -> usize {
        let detected = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
        let available = detected.saturating_sub(1).max(1);
        self.cpus.map_or(available, |cap| cap.min(available))
    }

    /// GPUs granted to workers.
    #[must_use]
    pub fn gpus_used(&self) -> usize {
        self.gpus.unwrap_or(0)
    }
}

fn default_node_id() -> String {
    format!("worker/{}", Uuid::new_v4())
}

fn default_http_host() -> String {
    "0.0.0.0".into()
}

fn default_http_port() -> u16 {
    5000
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Identifier of this participant node.
    #[serde(default = "default_node_id")]
    pub node_id: String,
    /// Root directory for cached features, predictions, and statistics.
    pub out_dir: PathBuf,
    /// `SQLite` file holding project records; defaults to `out_dir/operations.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
    /// Interface the HTTP binding listens on.
    #[serde(default = "default_http_host")]
    pub http_host: String,
    /// Port the HTTP binding listens on.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Worker process settings.
    pub worker: WorkerConfig,
    /// Compute allocation for worker processes.
    #[serde(default)]
    pub resources: ResourceConfig,
    /// Keep file-system paths out of log output.
    #[serde(default)]
    pub censored: bool,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string and normalize paths.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the project record database.
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.out_dir.join("operations.db"))
    }

    /// Directory holding a project's cached preprocessing exports.
    #[must_use]
    pub fn cache_dir(&self, project_id: &str) -> PathBuf {
        self.out_dir.join(project_id).join("preprocessing")
    }

    /// Directory holding a run's prediction artifacts for one dataset role.
    #[must_use]
    pub fn predict_dir(&self, project_id: &str, expt_id: &str, run_id: &str, role: &str) -> PathBuf {
        self.out_dir
            .join(project_id)
            .join(expt_id)
            .join(run_id)
            .join(role)
    }

    /// Render `path` for a log line, honouring `censored`.
    #[must_use]
    pub fn log_path(&self, path: &Path) -> String {
        if self.censored {
            "<censored>".into()
        } else {
            path.display().to_string()
        }
    }

    fn validate(&mut self) -> Result<()> {
        if self.worker.program.trim().is_empty() {
            return Err(AppError::Config("worker.program must not be empty".into()));
        }

        if self.worker.stop_timeout_seconds == 0 || self.worker.join_timeout_seconds == 0 {
            return Err(AppError::Config(
                "worker timeouts must be greater than zero".into(),
            ));
        }

        if self.node_id.trim().is_empty() {
            return Err(AppError::Config("node_id must not be empty".into()));
        }

        fs::create_dir_all(&self.out_dir)
            .map_err(|err| AppError::Config(format!("out_dir cannot be created: {err}")))?;
        let canonical = self
            .out_dir
            .canonicalize()
            .map_err(|err| AppError::Config(format!("out_dir invalid: {err}")))?;
        self.out_dir = canonical;

        if let Some(cap) = self.resources.cpus {
            let granted = self.resources.cores_used();
            if cap > granted {
                warn!(requested = cap, granted, "cpu cap exceeds available cores");
            }
        }

        Ok(())
    }
}
