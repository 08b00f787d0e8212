//! Thin HTTP binding of the external operations.
//!
//! | Route                                         | Operation    |
//! |-----------------------------------------------|--------------|
//! | `GET  /health`                                | liveness     |
//! | `POST /poll/{project_id}`                     | registration |
//! | `POST /initialise/{project_id}/{expt}/{run}`  | initialise   |
//! | `POST /align/{project_id}`                    | alignment    |
//! | `POST /predict/{project_id}/{expt}/{run}`     | predictions  |
//! | `POST /terminate/{project_id}/{expt}/{run}`   | termination  |
//! | `POST /finish/{project_id}/{expt}/{run}`      | run complete |
//! | `GET  /projects/{project_id}`                 | status       |

pub mod response;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::rpc::align::{align, AlignRequest};
use crate::rpc::finish::finish;
use crate::rpc::initialise::initialise;
use crate::rpc::poll::{poll, PollRequest};
use crate::rpc::predict::{predict, PredictRequest};
use crate::rpc::status::status;
use crate::rpc::terminate::terminate;
use crate::rpc::ServiceContext;
use crate::{AppError, Result};

use self::response::{rejected, respond};

type RunPath = Path<(String, String, String)>;

/// Handler for `GET /health`.
async fn health() -> &'static str {
    "ok"
}

async fn poll_route(
    State(ctx): State<ServiceContext>,
    Path(project_id): Path<String>,
    body: std::result::Result<Json<PollRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(request)) => respond("poll", poll(&ctx, &project_id, request).await),
        Err(rejection) => rejected("poll", &rejection),
    }
}

async fn initialise_route(
    State(ctx): State<ServiceContext>,
    Path((project_id, expt_id, run_id)): RunPath,
) -> Response {
    respond(
        "initialise",
        initialise(&ctx, &project_id, &expt_id, &run_id).await,
    )
}

async fn align_route(
    State(ctx): State<ServiceContext>,
    Path(project_id): Path<String>,
    body: std::result::Result<Json<AlignRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(request)) => respond("align", align(&ctx, &project_id, request).await),
        Err(rejection) => rejected("align", &rejection),
    }
}

async fn predict_route(
    State(ctx): State<ServiceContext>,
    Path((project_id, expt_id, run_id)): RunPath,
    body: std::result::Result<Json<PredictRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(request)) => respond(
            "predict",
            predict(&ctx, &project_id, &expt_id, &run_id, request).await,
        ),
        Err(rejection) => rejected("predict", &rejection),
    }
}

async fn terminate_route(
    State(ctx): State<ServiceContext>,
    Path((project_id, expt_id, run_id)): RunPath,
) -> Response {
    respond(
        "terminate",
        terminate(&ctx, &project_id, &expt_id, &run_id).await,
    )
}

async fn finish_route(
    State(ctx): State<ServiceContext>,
    Path((project_id, expt_id, run_id)): RunPath,
) -> Response {
    respond("finish", finish(&ctx, &project_id, &expt_id, &run_id).await)
}

async fn status_route(
    State(ctx): State<ServiceContext>,
    Path(project_id): Path<String>,
) -> Response {
    respond("status", status(&ctx, &project_id).await)
}

/// Build the router over a shared context.
pub fn router(ctx: ServiceContext) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/poll/{project_id}", post(poll_route))
        .route("/initialise/{project_id}/{expt_id}/{run_id}", post(initialise_route))
        .route("/align/{project_id}", post(align_route))
        .route("/predict/{project_id}/{expt_id}/{run_id}", post(predict_route))
        .route("/terminate/{project_id}/{expt_id}/{run_id}", post(terminate_route))
        .route("/finish/{project_id}/{expt_id}/{run_id}", post(finish_route))
        .route("/projects/{project_id}", get(status_route))
        .with_state(ctx)
}

/// Serve the router on `listener` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve_http(listener: TcpListener, ctx: ServiceContext, ct: CancellationToken) -> Result<()> {
    let local = listener
        .local_addr()
        .map_err(|err| AppError::Io(format!("listener has no local address: {err}")))?;
    info!(%local, "starting HTTP transport");

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await
        .map_err(|err| AppError::Io(format!("HTTP server error: {err}")))?;

    info!("HTTP transport shut down");
    Ok(())
}
