//! Run initialisation: ensure a live session and mark the run in progress.

use tracing::{info, info_span, Instrument};

use crate::models::combination::CombinationKey;
use crate::models::project::ProjectRecord;
use crate::Result;

use super::{validate_identifier, ServiceContext};

/// Start (or reuse) the project's session and add the run to `in_progress`.
///
/// A session that is already live is reused rather than rejected.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the project is not registered,
/// `AppError::InvalidInput` for invalid identifiers, or any error from
/// starting the session.
pub async fn initialise(
    ctx: &ServiceContext,
    project_id: &str,
    expt_id: &str,
    run_id: &str,
) -> Result<ProjectRecord> {
    validate_identifier("project_id", project_id)?;
    validate_identifier("expt_id", expt_id)?;
    validate_identifier("run_id", run_id)?;
    let key = CombinationKey::encode(expt_id, run_id)?;
    let span = info_span!("initialise", project_id, expt_id, run_id);

    async {
        let guard = ctx.locks.acquire(project_id).await;
        let projects = ctx.projects();

        let record = if ctx.registry.contains(project_id) {
            projects.get(project_id).await?
        } else {
            ctx.lifecycle.start(&guard).await?
        };

        let mut fields = record.fields;
        fields.in_progress.insert(key.as_str().to_owned());
        let record = projects.update(project_id, &fields).await?;

        info!(project_id, key = key.as_str(), "run initialised");
        Ok(record)
    }
    .instrument(span)
    .await
}
