//! Project record model and session state helpers.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::statistics::Statistics;
use crate::AppError;

/// Role a registered dataset plays in a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DatasetRole {
    /// Training partition.
    Train,
    /// Evaluation partition.
    Evaluate,
    /// Inference-only partition.
    Predict,
}

impl DatasetRole {
    /// All roles in canonical order.
    pub const ALL: [Self; 3] = [Self::Train, Self::Evaluate, Self::Predict];

    /// Lowercase name used in paths and JSON keys.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Evaluate => "evaluate",
            Self::Predict => "predict",
        }
    }
}

impl Display for DatasetRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "train" => Ok(Self::Train),
            "evaluate" => Ok(Self::Evaluate),
            "predict" => Ok(Self::Predict),
            other => Err(AppError::InvalidInput(format!("unknown dataset role: {other}"))),
        }
    }
}

/// Tag-paths of the datasets registered under each role.
pub type Tags = BTreeMap<DatasetRole, Vec<Vec<String>>>;

/// Null-column insertion indices for one role.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct XyAlignment {
    /// Feature columns to pad.
    #[serde(rename = "X")]
    pub x: Vec<u32>,
    /// Label columns to pad.
    pub y: Vec<u32>,
}

/// Alignments for every role.
pub type Alignments = BTreeMap<DatasetRole, XyAlignment>;

/// Cached artifact paths for one role.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportPaths {
    /// Preprocessed features.
    #[serde(rename = "X", default, skip_serializing_if = "Option::is_none")]
    pub x: Option<PathBuf>,
    /// Preprocessed labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<PathBuf>,
    /// Combined dataframe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataframe: Option<PathBuf>,
    /// Schema catalogue.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalogue: Option<PathBuf>,
    /// Most recent inference predictions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<PathBuf>,
    /// Most recent inference scores.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scores: Option<PathBuf>,
}

/// Statistics and the artifact they were written to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InferenceResult {
    /// Computed statistics.
    pub statistics: Statistics,
    /// Path of the exported statistics JSON.
    pub res_path: PathBuf,
}

/// Per-role results of one (experiment, run) combination.
pub type RunResults = BTreeMap<DatasetRole, InferenceResult>;

/// Lifecycle state of a project's worker session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No session has been started yet.
    Uninitialised,
    /// A worker process is registered for the project.
    Live,
    /// The session was torn down; a new start re-initialises it.
    Terminated,
}

impl SessionState {
    /// Determine whether a lifecycle transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uninitialised | Self::Terminated, Self::Live) | (Self::Live, Self::Terminated)
        )
    }
}

/// Mutable fields of a project record.
///
/// Record updates replace all of these at once, so callers read, modify,
/// and write back the full set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectFields {
    /// Registered dataset tags per role.
    #[serde(default)]
    pub tags: Tags,
    /// Null-column alignments per role.
    #[serde(default)]
    pub alignments: Alignments,
    /// Cached artifact paths per role.
    #[serde(default)]
    pub exports: BTreeMap<DatasetRole, ExportPaths>,
    /// Combination keys of runs currently executing.
    #[serde(default)]
    pub in_progress: BTreeSet<String>,
    /// Results keyed by combination key.
    #[serde(default)]
    pub results: BTreeMap<String, RunResults>,
    /// Whether a worker process is registered for the project.
    #[serde(default)]
    pub is_live: bool,
    /// When the last session was terminated.
    #[serde(default)]
    pub terminated_at: Option<DateTime<Utc>>,
}

impl ProjectFields {
    /// Fields for a freshly registered project.
    #[must_use]
    pub fn with_tags(tags: Tags) -> Self {
        Self {
            tags,
            ..Self::default()
        }
    }

    /// Session state derived from the liveness flag and termination time.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        if self.is_live {
            SessionState::Live
        } else if self.terminated_at.is_some() {
            SessionState::Terminated
        } else {
            SessionState::Uninitialised
        }
    }
}

/// Persisted lifecycle document for one project.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectRecord {
    /// Primary key; immutable once created.
    pub project_id: String,
    /// Mutable document body.
    #[serde(flatten)]
    pub fields: ProjectFields,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    /// Session state of the project.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.fields.session_state()
    }
}
