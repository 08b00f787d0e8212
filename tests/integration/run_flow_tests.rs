//! Full run: register, initialise, predict, finish, terminate.

use std::collections::BTreeMap;

use fl_participant::export::LabelRow;
use fl_participant::models::project::{DatasetRole, SessionState};
use fl_participant::rpc::finish::finish;
use fl_participant::rpc::initialise::initialise;
use fl_participant::rpc::predict::{predict, Inference, PredictRequest};
use fl_participant::rpc::status::status;
use fl_participant::rpc::terminate::terminate;
use fl_participant::AppError;

use super::test_helpers::{register, sleeping_config, test_context};

fn perfect_train_inference() -> PredictRequest {
    let mut inferences = BTreeMap::new();
    inferences.insert(
        DatasetRole::Train,
        Inference {
            y_pred: [0.0, 1.0, 1.0, 0.0].into_iter().map(LabelRow::Scalar).collect(),
            y_score: [0.2, 0.7, 0.9, 0.1]
                .into_iter()
                .map(|v| LabelRow::Vector(vec![v]))
                .collect(),
        },
    );
    PredictRequest { inferences }
}

#[tokio::test]
async fn initialise_starts_session_and_tracks_run() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;

    let record = initialise(&ctx, "p1", "e1", "r1").await.expect("initialise");
    assert!(record.fields.is_live);
    assert!(record.fields.in_progress.contains("e1/r1"));
    assert!(ctx.registry.contains("p1"));

    // A second run reuses the live session.
    let record = initialise(&ctx, "p1", "e1", "r2").await.expect("initialise again");
    assert_eq!(record.fields.in_progress.len(), 2);
    assert_eq!(ctx.registry.len(), 1);

    let snapshot = status(&ctx, "p1").await.expect("status");
    assert_eq!(snapshot.session_state, SessionState::Live);
    assert!(snapshot.session.is_some_and(|info| info.loop_running));

    ctx.lifecycle.terminate_all(&ctx.locks).await;
}

#[tokio::test]
async fn initialise_of_unregistered_project_is_not_found() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;

    let err = initialise(&ctx, "ghost", "e1", "r1").await.expect_err("no project");
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(ctx.registry.is_empty());
}

#[tokio::test]
async fn full_run_ends_with_session_terminated() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;

    initialise(&ctx, "p1", "e1", "r1").await.expect("initialise");
    initialise(&ctx, "p1", "e1", "r2").await.expect("initialise");

    let record = predict(&ctx, "p1", "e1", "r1", perfect_train_inference())
        .await
        .expect("predict");
    let stats = &record.fields.results["e1/r1"][&DatasetRole::Train].statistics;
    assert!((stats.accuracy.value() - 1.0).abs() < 1e-12);

    let record = finish(&ctx, "p1", "e1", "r1").await.expect("finish");
    assert!(!record.fields.in_progress.contains("e1/r1"));

    let record = terminate(&ctx, "p1", "e1", "r2").await.expect("terminate");
    assert!(!record.fields.is_live);
    assert!(record.fields.in_progress.is_empty());
    assert!(record.fields.results.contains_key("e1/r1"));
    assert!(ctx.registry.get("p1").is_none());

    let err = terminate(&ctx, "p1", "e1", "r2").await.expect_err("already terminated");
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn concurrent_initialise_spawns_one_worker() {
    let temp = tempfile::tempdir().expect("tempdir");
    let ctx = test_context(sleeping_config(temp.path())).await;
    register(&ctx, "p1").await;

    let (a, b) = tokio::join!(
        initialise(&ctx, "p1", "e1", "r1"),
        initialise(&ctx, "p1", "e1", "r2"),
    );
    a.expect("first initialise");
    b.expect("second initialise");

    assert_eq!(ctx.registry.len(), 1);
    let record = ctx.projects().get("p1").await.expect("get");
    assert_eq!(record.fields.in_progress.len(), 2);

    ctx.lifecycle.terminate_all(&ctx.locks).await;
}
