//! Read-only project status.

use serde::Serialize;

use crate::models::project::{ProjectRecord, SessionState};
use crate::orchestrator::registry::SessionInfo;
use crate::Result;

use super::{validate_identifier, ServiceContext};

/// Record snapshot plus the live session, if any.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectStatus {
    /// Persisted record.
    #[serde(flatten)]
    pub record: ProjectRecord,
    /// Derived lifecycle state.
    pub session_state: SessionState,
    /// Registry entry for a live session.
    pub session: Option<SessionInfo>,
}

/// Snapshot a project's record and session.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the project is absent.
pub async fn status(ctx: &ServiceContext, project_id: &str) -> Result<ProjectStatus> {
    validate_identifier("project_id", project_id)?;
    let record = ctx.projects().get(project_id).await?;
    Ok(ProjectStatus {
        session_state: record.session_state(),
        session: ctx.registry.get(project_id),
        record,
    })
}
