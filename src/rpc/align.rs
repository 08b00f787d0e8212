//! Alignment apply.

use serde::Deserialize;
use tracing::{info, info_span, Instrument};

use crate::models::project::{Alignments, ProjectRecord, Tags};
use crate::{AppError, Result};

use super::{validate_identifier, ServiceContext};

/// Alignment payload.
#[derive(Debug, Clone, Deserialize)]
pub struct AlignRequest {
    /// Tags the coordinator computed the alignment for.
    pub tags: Tags,
    /// Null-column insertion indices per role.
    pub alignments: Alignments,
}

/// Record alignments after checking the tags match the registration.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the project is absent,
/// `AppError::ValidationMismatch` if the tags differ from the stored tags
/// (alignments are left untouched), or `AppError::InvalidInput` if an
/// alignment names a role without tags.
pub async fn align(ctx: &ServiceContext, project_id: &str, request: AlignRequest) -> Result<ProjectRecord> {
    validate_identifier("project_id", project_id)?;
    let span = info_span!("align", project_id);

    async {
        let _guard = ctx.locks.acquire(project_id).await;
        let projects = ctx.projects();
        let record = projects.get(project_id).await?;

        if record.fields.tags != request.tags {
            return Err(AppError::ValidationMismatch(format!(
                "tags do not match those registered for project '{project_id}'"
            )));
        }
        if let Some(role) = request
            .alignments
            .keys()
            .find(|role| !record.fields.tags.contains_key(*role))
        {
            return Err(AppError::InvalidInput(format!(
                "alignment supplied for role '{role}' which has no tags"
            )));
        }

        let mut fields = record.fields;
        fields.alignments = request.alignments;
        let record = projects.update(project_id, &fields).await?;

        info!(project_id, roles = record.fields.alignments.len(), "alignments applied");
        Ok(record)
    }
    .instrument(span)
    .await
}
