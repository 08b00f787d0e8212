//! External operations that do not need a live worker.

use std::collections::BTreeMap;

use fl_participant::export::LabelRow;
use fl_participant::models::project::{DatasetRole, SessionState, XyAlignment};
use fl_participant::models::statistics::Reported;
use fl_participant::rpc::align::{align, AlignRequest};
use fl_participant::rpc::finish::finish;
use fl_participant::rpc::poll::{poll, PollRequest};
use fl_participant::rpc::predict::{predict, Inference, PredictRequest};
use fl_participant::rpc::status::status;
use fl_participant::rpc::terminate::terminate;
use fl_participant::rpc::{validate_identifier, ServiceContext};
use fl_participant::AppError;

use super::test_helpers::{register, sample_tags, sleeping_config, test_context};

async fn mark_in_progress(ctx: &ServiceContext, project_id: &str, key: &str) {
    let projects = ctx.projects();
    let mut fields = projects.get(project_id).await.expect("get").fields;
    fields.in_progress.insert(key.to_owned());
    projects.update(project_id, &fields).await.expect("update");
}

fn train_inference() -> PredictRequest {
    let mut inferences = BTreeMap::new();
    inferences.insert(
        DatasetRole::Train,
        Inference {
            y_pred: [0.0, 1.0, 0.0, 0.0].into_iter().map(LabelRow::Scalar).collect(),
            y_score: [0.1, 0.9, 0.4, 0.2]
                .into_iter()
                .map(|v| LabelRow::Vector(vec![v]))
                .collect(),
        },
    );
    PredictRequest { inferences }
}

fn sample_alignments() -> BTreeMap<DatasetRole, XyAlignment> {
    let mut alignments = BTreeMap::new();
    alignments.insert(
        DatasetRole::Train,
        XyAlignment {
            x: vec![1, 3],
            y: vec![],
        },
    );
    alignments
}

#[test]
fn identifiers_must_be_single_path_segments() {
    assert!(validate_identifier("project_id", "p-1").is_ok());
    for bad in ["", ".", "..", "a/b", "a\\b"] {
        assert!(matches!(
            validate_identifier("project_id", bad),
            Err(AppError::InvalidInput(_))
        ));
    }
}

#[tokio::test]
async fn poll_registers_project_and_caches_labels() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;

    let record = register(&ctx, "p1").await;
    assert_eq!(record.fields.tags, sample_tags());
    assert_eq!(record.session_state(), SessionState::Uninitialised);

    let y_path = record.fields.exports[&DatasetRole::Train]
        .y
        .clone()
        .expect("cached labels");
    assert_eq!(y_path, ctx.config.cache_dir("p1").join("preprocessed_y_train.json"));
    assert!(y_path.is_file());
    assert!(!record.fields.exports.contains_key(&DatasetRole::Evaluate));
}

#[tokio::test]
async fn second_poll_is_already_exists() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;

    let err = poll(
        &ctx,
        "p1",
        PollRequest {
            tags: sample_tags(),
            labels: BTreeMap::new(),
        },
    )
    .await
    .expect_err("already registered");
    assert!(matches!(err, AppError::AlreadyExists(_)));
}

#[tokio::test]
async fn poll_rejects_labels_for_untagged_roles() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    let mut labels = BTreeMap::new();
    labels.insert(DatasetRole::Predict, vec![LabelRow::Scalar(1.0)]);

    let err = poll(
        &ctx,
        "p1",
        PollRequest {
            tags: sample_tags(),
            labels,
        },
    )
    .await
    .expect_err("predict role has no tags");
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert!(ctx.projects().read("p1").await.expect("read").is_none());
}

#[tokio::test]
async fn align_with_mismatched_tags_leaves_alignments_untouched() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;

    let mut other_tags = BTreeMap::new();
    other_tags.insert(DatasetRole::Train, vec![vec!["a".to_owned(), "1".to_owned()]]);
    let err = align(
        &ctx,
        "p1",
        AlignRequest {
            tags: other_tags,
            alignments: sample_alignments(),
        },
    )
    .await
    .expect_err("tags differ");
    assert!(matches!(err, AppError::ValidationMismatch(_)));
    assert_eq!(err.status_code(), 404);

    let record = ctx.projects().get("p1").await.expect("get");
    assert!(record.fields.alignments.is_empty());
}

#[tokio::test]
async fn align_with_matching_tags_records_alignments() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;

    let record = align(
        &ctx,
        "p1",
        AlignRequest {
            tags: sample_tags(),
            alignments: sample_alignments(),
        },
    )
    .await
    .expect("align");
    assert_eq!(record.fields.alignments, sample_alignments());
    assert_eq!(record.fields.tags, sample_tags());
}

#[tokio::test]
async fn align_on_unknown_project_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;

    let err = align(
        &ctx,
        "ghost",
        AlignRequest {
            tags: sample_tags(),
            alignments: sample_alignments(),
        },
    )
    .await
    .expect_err("no project");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn predict_for_key_not_in_progress_writes_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;
    let before = ctx.projects().get("p1").await.expect("get");

    let err = predict(&ctx, "p1", "e1", "r1", train_inference())
        .await
        .expect_err("not in progress");
    assert!(matches!(err, AppError::NotFound(_)));

    let after = ctx.projects().get("p1").await.expect("get");
    assert_eq!(before, after);
    assert!(after.fields.exports[&DatasetRole::Train].predictions.is_none());
    assert!(!ctx.config.out_dir.join("p1").join("e1").exists());
}

#[tokio::test]
async fn predict_without_cached_labels_is_metadata_tracing() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    poll(
        &ctx,
        "p1",
        PollRequest {
            tags: sample_tags(),
            labels: BTreeMap::new(),
        },
    )
    .await
    .expect("poll");
    mark_in_progress(&ctx, "p1", "e1/r1").await;

    let err = predict(&ctx, "p1", "e1", "r1", train_inference())
        .await
        .expect_err("no labels");
    assert!(matches!(err, AppError::MetadataTracing(_)));
    assert_eq!(err.status_code(), 417);
    assert!(!ctx.config.out_dir.join("p1").join("e1").exists());
}

#[tokio::test]
async fn predict_benchmarks_and_exports_artifacts() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;
    mark_in_progress(&ctx, "p1", "e1/r1").await;

    let record = predict(&ctx, "p1", "e1", "r1", train_inference())
        .await
        .expect("predict");

    let result = &record.fields.results["e1/r1"][&DatasetRole::Train];
    // labels [0,1,1,0] vs predictions [0,1,0,0]
    assert!((result.statistics.accuracy.value() - 0.75).abs() < 1e-12);
    assert_eq!(result.statistics.tp, Reported::Single(1));
    assert_eq!(result.statistics.fn_, Reported::Single(1));
    assert!(result.res_path.is_file());
    assert!(result
        .res_path
        .ends_with("p1/e1/r1/train/inference_statistics_train.json"));

    let exports = &record.fields.exports[&DatasetRole::Train];
    let predictions = exports.predictions.clone().expect("predictions path");
    let scores = exports.scores.clone().expect("scores path");
    assert_eq!(std::fs::read_to_string(predictions).expect("read"), "0\n1\n0\n0\n");
    assert_eq!(std::fs::read_to_string(scores).expect("read"), "0.1\n0.9\n0.4\n0.2\n");
    assert!(exports.y.is_some(), "cached labels path is kept");

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&result.res_path).expect("read"))
            .expect("json");
    assert_eq!(written["TP"], 1);
}

#[tokio::test]
async fn resubmission_overwrites_results_for_the_key() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;
    mark_in_progress(&ctx, "p1", "e1/r1").await;

    predict(&ctx, "p1", "e1", "r1", train_inference())
        .await
        .expect("first predict");

    let mut perfect = train_inference();
    perfect.inferences.insert(
        DatasetRole::Train,
        Inference {
            y_pred: [0.0, 1.0, 1.0, 0.0].into_iter().map(LabelRow::Scalar).collect(),
            y_score: [0.1, 0.9, 0.8, 0.2]
                .into_iter()
                .map(|v| LabelRow::Vector(vec![v]))
                .collect(),
        },
    );
    let record = predict(&ctx, "p1", "e1", "r1", perfect)
        .await
        .expect("second predict");

    assert_eq!(record.fields.results.len(), 1);
    let stats = &record.fields.results["e1/r1"][&DatasetRole::Train].statistics;
    assert!((stats.accuracy.value() - 1.0).abs() < 1e-12);
}

#[tokio::test]
async fn predict_with_mismatched_lengths_is_invalid_input() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;
    mark_in_progress(&ctx, "p1", "e1/r1").await;

    let mut request = train_inference();
    if let Some(inference) = request.inferences.get_mut(&DatasetRole::Train) {
        inference.y_pred.pop();
    }
    let err = predict(&ctx, "p1", "e1", "r1", request)
        .await
        .expect_err("length mismatch");
    assert!(matches!(err, AppError::InvalidInput(_)));
    assert!(ctx.projects().get("p1").await.expect("get").fields.results.is_empty());
}

#[tokio::test]
async fn finish_removes_key_once() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;
    mark_in_progress(&ctx, "p1", "e1/r1").await;

    let record = finish(&ctx, "p1", "e1", "r1").await.expect("finish");
    assert!(record.fields.in_progress.is_empty());

    let err = finish(&ctx, "p1", "e1", "r1").await.expect_err("already finished");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn terminate_without_live_session_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;
    mark_in_progress(&ctx, "p1", "e1/r1").await;
    let before = ctx.projects().get("p1").await.expect("get");

    let err = terminate(&ctx, "p1", "e1", "r1").await.expect_err("nothing live");
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(ctx.projects().get("p1").await.expect("get"), before);
}

#[tokio::test]
async fn status_reports_record_and_absent_session() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;

    let snapshot = status(&ctx, "p1").await.expect("status");
    assert_eq!(snapshot.session_state, SessionState::Uninitialised);
    assert!(snapshot.session.is_none());
    assert_eq!(snapshot.record.project_id, "p1");

    assert!(matches!(status(&ctx, "ghost").await, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn predict_skips_roles_sent_empty() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;
    mark_in_progress(&ctx, "p1", "e1/r1").await;

    // Evaluate has no cached labels, so it must be skipped before lookup.
    let request: PredictRequest = serde_json::from_value(serde_json::json!({
        "inferences": {
            "train": {
                "y_pred": [0, 1, 0, 0],
                "y_score": [[0.1], [0.9], [0.4], [0.2]]
            },
            "evaluate": {}
        }
    }))
    .expect("payload with an empty role decodes");

    let record = predict(&ctx, "p1", "e1", "r1", request).await.expect("predict");
    let results = &record.fields.results["e1/r1"];
    assert_eq!(results.len(), 1);
    assert!(results.contains_key(&DatasetRole::Train));
    assert!(record
        .fields
        .exports
        .get(&DatasetRole::Evaluate)
        .is_none_or(|paths| paths.predictions.is_none()));
}

#[tokio::test]
async fn predict_with_only_empty_roles_is_invalid_input() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;
    mark_in_progress(&ctx, "p1", "e1/r1").await;

    let mut inferences = BTreeMap::new();
    inferences.insert(DatasetRole::Train, Inference::default());
    let err = predict(&ctx, "p1", "e1", "r1", PredictRequest { inferences })
        .await
        .expect_err("nothing to score");
    assert!(matches!(err, AppError::InvalidInput(_)));

    let record = ctx.projects().get("p1").await.expect("get");
    assert!(record.fields.results.is_empty());
}

#[tokio::test]
async fn requests_for_unknown_projects_release_their_locks() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;

    for i in 0..200 {
        let err = finish(&ctx, &format!("ghost-{i}"), "e1", "r1")
            .await
            .expect_err("unknown project");
        assert!(matches!(err, AppError::NotFound(_)));
    }
    assert!(ctx.locks.is_empty());
}
