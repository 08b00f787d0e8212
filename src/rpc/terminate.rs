//! Session termination.

use tracing::{info_span, Instrument};

use crate::models::combination::CombinationKey;
use crate::models::project::ProjectRecord;
use crate::Result;

use super::{validate_identifier, ServiceContext};

/// Tear down the project's live session and retire the run.
///
/// # Errors
///
/// Returns `AppError::NotFound` if no session is live (the record is not
/// modified), or `AppError::ResourceTeardown` if the worker would not stop.
pub async fn terminate(
    ctx: &ServiceContext,
    project_id: &str,
    expt_id: &str,
    run_id: &str,
) -> Result<ProjectRecord> {
    validate_identifier("project_id", project_id)?;
    let key = CombinationKey::encode(expt_id, run_id)?;
    let span = info_span!("terminate", project_id, expt_id, run_id);

    async {
        let guard = ctx.locks.acquire(project_id).await;
        ctx.lifecycle.terminate(guard, Some(&key)).await
    }
    .instrument(span)
    .await
}
