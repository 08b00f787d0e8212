//! Prediction ingestion.
//!
//! Labels come only from the cached export `exports[role].y`. Every role
//! is validated and benchmarked before any artifact is written, so a
//! rejected request leaves no files and no export paths behind.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, info_span, Instrument};

use crate::benchmark::{to_class_indices, Benchmarker};
use crate::export::{self, LabelRow};
use crate::models::combination::CombinationKey;
use crate::models::project::{DatasetRole, InferenceResult, ProjectRecord, RunResults};
use crate::models::statistics::Statistics;
use crate::{AppError, Result};

use super::{validate_identifier, ServiceContext};

/// Predictions for one dataset role.
///
/// A role sent as `{}` deserializes to an empty inference and is skipped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inference {
    /// Predicted labels: class indices or one-hot rows.
    #[serde(default)]
    pub y_pred: Vec<LabelRow>,
    /// Predicted scores: one column for binary, one per class otherwise.
    #[serde(default)]
    pub y_score: Vec<LabelRow>,
}

impl Inference {
    /// Whether the role carries no predictions at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.y_pred.is_empty() && self.y_score.is_empty()
    }
}

/// Prediction payload.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictRequest {
    /// Predictions per role.
    pub inferences: BTreeMap<DatasetRole, Inference>,
}

/// A role that passed validation, ready to be written.
struct Scored {
    role: DatasetRole,
    predictions: Vec<usize>,
    scores: Vec<Vec<f64>>,
    statistics: Statistics,
}

/// Benchmark predictions against cached labels and record the results.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the project is absent or the run is not
/// in progress, `AppError::MetadataTracing` if a role has no cached label
/// export, `AppError::InvalidInput` for malformed rows, and `AppError::Io`
/// if writing an artifact fails.
pub async fn predict(
    ctx: &ServiceContext,
    project_id: &str,
    expt_id: &str,
    run_id: &str,
    request: PredictRequest,
) -> Result<ProjectRecord> {
    validate_identifier("project_id", project_id)?;
    validate_identifier("expt_id", expt_id)?;
    validate_identifier("run_id", run_id)?;
    let key = CombinationKey::encode(expt_id, run_id)?;
    let span = info_span!("predict", project_id, expt_id, run_id);

    async {
        let _guard = ctx.locks.acquire(project_id).await;
        let projects = ctx.projects();
        let mut fields = projects.get(project_id).await?.fields;

        if !fields.in_progress.contains(key.as_str()) {
            return Err(AppError::NotFound(format!(
                "combination '{key}' is not in progress for project '{project_id}'"
            )));
        }

        let inferences: Vec<(DatasetRole, Inference)> = request
            .inferences
            .into_iter()
            .filter(|(_, inference)| !inference.is_empty())
            .collect();
        if inferences.is_empty() {
            return Err(AppError::InvalidInput("no inferences supplied".into()));
        }

        // ── Validate and score every role ────────────────────
        let mut scored = Vec::with_capacity(inferences.len());
        for (role, inference) in inferences {
            let labels_path = fields
                .exports
                .get(&role)
                .and_then(|paths| paths.y.clone())
                .ok_or_else(|| {
                    AppError::MetadataTracing(format!(
                        "no cached labels for role '{role}' of project '{project_id}'"
                    ))
                })?;
            scored.push(score_role(role, &labels_path, inference)?);
        }

        // ── Write artifacts and record results ───────────────
        let mut run_results = RunResults::new();
        for entry in scored {
            let role_name = entry.role.as_str();
            let dir = ctx.config.predict_dir(project_id, expt_id, run_id, role_name);

            let predictions_path = dir.join(format!("inference_predictions_{role_name}.txt"));
            let summary =
                export::write_atomic(&predictions_path, &export::format_indices(&entry.predictions))?;
            debug!(
                path = %ctx.config.log_path(&summary.path),
                bytes = summary.bytes_written,
                "predictions exported"
            );

            let scores_path = dir.join(format!("inference_scores_{role_name}.txt"));
            let summary = export::write_atomic(&scores_path, &export::format_rows(&entry.scores))?;
            debug!(
                path = %ctx.config.log_path(&summary.path),
                bytes = summary.bytes_written,
                "scores exported"
            );

            let statistics_path = dir.join(format!("inference_statistics_{role_name}.json"));
            let summary = export::write_json(&statistics_path, &entry.statistics)?;
            debug!(
                path = %ctx.config.log_path(&summary.path),
                bytes = summary.bytes_written,
                "statistics exported"
            );

            let paths = fields.exports.entry(entry.role).or_default();
            paths.predictions = Some(predictions_path);
            paths.scores = Some(scores_path);

            run_results.insert(
                entry.role,
                InferenceResult {
                    statistics: entry.statistics,
                    res_path: statistics_path,
                },
            );
        }
        fields.results.insert(key.as_str().to_owned(), run_results);

        let record = projects.update(project_id, &fields).await?;
        info!(project_id, key = key.as_str(), "predictions ingested");
        Ok(record)
    }
    .instrument(span)
    .await
}

fn score_role(role: DatasetRole, labels_path: &Path, inference: Inference) -> Result<Scored> {
    let y_true = to_class_indices(&export::read_label_rows(labels_path)?)?;
    let scores: Vec<Vec<f64>> = inference.y_score.into_iter().map(LabelRow::into_vec).collect();
    let pred_rows: Vec<Vec<f64>> = inference.y_pred.into_iter().map(LabelRow::into_vec).collect();
    let predictions = to_class_indices(&pred_rows)?;

    let benchmarker = Benchmarker::new(y_true, predictions.clone(), scores.clone())?;

    Ok(Scored {
        role,
        predictions,
        scores,
        statistics: benchmarker.calculate_stats(),
    })
}
