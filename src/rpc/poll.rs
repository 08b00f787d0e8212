//! Project registration.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::{debug, info, info_span, Instrument};

use crate::export::{self, LabelRow};
use crate::models::project::{DatasetRole, ProjectFields, ProjectRecord, Tags};
use crate::{AppError, Result};

use super::{validate_identifier, ServiceContext};

/// Registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PollRequest {
    /// Dataset tag-paths per role.
    pub tags: Tags,
    /// Optional label rows per role, cached for later benchmarking.
    #[serde(default)]
    pub labels: BTreeMap<DatasetRole, Vec<LabelRow>>,
}

/// Register a project: cache its labels and create its record.
///
/// # Errors
///
/// Returns `AppError::AlreadyExists` if the project is registered,
/// `AppError::InvalidInput` for an invalid id, empty tags, or labels for a
/// role without tags, and `AppError::Io` if caching labels fails.
pub async fn poll(ctx: &ServiceContext, project_id: &str, request: PollRequest) -> Result<ProjectRecord> {
    validate_identifier("project_id", project_id)?;
    let span = info_span!("poll", project_id);

    async {
        if request.tags.is_empty() {
            return Err(AppError::InvalidInput("tags must name at least one role".into()));
        }
        if let Some(role) = request.labels.keys().find(|role| !request.tags.contains_key(*role)) {
            return Err(AppError::InvalidInput(format!(
                "labels supplied for role '{role}' which has no tags"
            )));
        }

        let _guard = ctx.locks.acquire(project_id).await;
        let projects = ctx.projects();
        if projects.read(project_id).await?.is_some() {
            return Err(AppError::AlreadyExists(format!(
                "project '{project_id}' is already registered"
            )));
        }

        let mut fields = ProjectFields::with_tags(request.tags);
        let cache_dir = ctx.config.cache_dir(project_id);
        for (role, rows) in request.labels {
            let path = cache_dir.join(format!("preprocessed_y_{role}.json"));
            let summary = export::write_json(&path, &rows)?;
            debug!(
                %role,
                path = %ctx.config.log_path(&summary.path),
                bytes = summary.bytes_written,
                "labels cached"
            );
            fields.exports.entry(role).or_default().y = Some(path);
        }

        let record = projects.create(project_id, &fields).await?;
        info!(project_id, roles = record.fields.tags.len(), "project registered");
        Ok(record)
    }
    .instrument(span)
    .await
}
