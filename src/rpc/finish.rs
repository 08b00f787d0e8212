//! Run completion.

use tracing::{info, info_span, Instrument};

use crate::models::combination::CombinationKey;
use crate::models::project::ProjectRecord;
use crate::{AppError, Result};

use super::{validate_identifier, ServiceContext};

/// Remove a completed run from `in_progress`.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the project is absent or the run is not
/// in progress.
pub async fn finish(
    ctx: &ServiceContext,
    project_id: &str,
    expt_id: &str,
    run_id: &str,
) -> Result<ProjectRecord> {
    validate_identifier("project_id", project_id)?;
    let key = CombinationKey::encode(expt_id, run_id)?;
    let span = info_span!("finish", project_id, expt_id, run_id);

    async {
        let _guard = ctx.locks.acquire(project_id).await;
        let projects = ctx.projects();
        let mut fields = projects.get(project_id).await?.fields;

        if !fields.in_progress.remove(key.as_str()) {
            return Err(AppError::NotFound(format!(
                "combination '{key}' is not in progress for project '{project_id}'"
            )));
        }

        let record = projects.update(project_id, &fields).await?;
        info!(project_id, key = key.as_str(), "run finished");
        Ok(record)
    }
    .instrument(span)
    .await
}
