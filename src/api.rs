//! HTTP surface over the lifecycle engine.
//!
//! Routes map one-to-one onto [`JobEngine`] operations. Engine calls run on
//! the blocking pool because repository backends hold blocking locks and may
//! do file or SQLite I/O.

use std::net::SocketAddr;

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::JobEngine;
use crate::error::BoardError;
use crate::state_machine::{JobId, JobStatus, NewJob};
use crate::store::JobFilter;

#[derive(Clone)]
pub struct AppState {
    pub engine: JobEngine,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateJobRequest {
    #[serde(default)]
    creator_id: String,
    #[serde(flatten)]
    fields: NewJob,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ClaimRequest {
    editor_id: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SubmitRequest {
    submission_url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ListQuery {
    status: Option<String>,
    creator_id: Option<String>,
    editor_id: Option<String>,
}

/// Error body returned by every failing route.
#[derive(Debug)]
pub enum ApiError {
    Board(BoardError),
    /// The handler task died before producing an answer.
    Internal(String),
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        Self::Board(err)
    }
}

/// Malformed or missing JSON bodies answer like a failed field check.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Board(BoardError::Validation(rejection.body_text()))
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let err = match self {
            ApiError::Board(err) => err,
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "request task failed");
                let body = json!({ "error": "internal_error", "message": message });
                return (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response();
            }
        };

        let status = match &err {
            BoardError::Validation(_) => StatusCode::BAD_REQUEST,
            BoardError::NotFound(_) => StatusCode::NOT_FOUND,
            BoardError::InvalidTransition { .. } => StatusCode::CONFLICT,
            BoardError::LedgerUpdateFailed { .. } => StatusCode::SERVICE_UNAVAILABLE,
            BoardError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "request failed");
        }

        let mut body = json!({
            "error": err.kind(),
            "message": err.to_string(),
        });
        if let BoardError::InvalidTransition {
            current, expected, ..
        } = &err
        {
            body["current"] = json!(current);
            body["expected"] = json!(expected);
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(engine: JobEngine) -> Router {
    Router::new()
        .route("/jobs", get(list_jobs_handler).post(create_job_handler))
        .route("/jobs/:id", get(get_job_handler))
        .route("/jobs/:id/claim", post(claim_job_handler))
        .route("/jobs/:id/submit", post(submit_job_handler))
        .route("/jobs/:id/approve", post(approve_job_handler))
        .route("/users/:id/stats", get(user_stats_handler))
        .route("/ledger/pending", get(pending_credits_handler))
        .route("/ledger/reconcile", post(reconcile_handler))
        .with_state(AppState { engine })
}

pub async fn serve(addr: SocketAddr, engine: JobEngine) -> anyhow::Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);
    let app = router(engine).layer(cors);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "bounty board listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received");
        })
        .await
        .context("HTTP server failed")
}

/// Run a blocking engine call off the async workers.
async fn run<T, F>(engine: JobEngine, op: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&JobEngine) -> Result<T, BoardError> + Send + 'static,
{
    Ok(tokio::task::spawn_blocking(move || op(&engine)).await??)
}

async fn create_job_handler(
    State(state): State<AppState>,
    payload: Result<Json<CreateJobRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let job = run(state.engine, move |e| e.create_job(&req.creator_id, req.fields)).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn list_jobs_handler(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let filter = JobFilter {
        status: query
            .status
            .as_deref()
            .map(str::parse::<JobStatus>)
            .transpose()?,
        creator_id: query.creator_id,
        editor_id: query.editor_id,
    };
    let jobs = run(state.engine, move |e| e.list_jobs(&filter)).await?;
    Ok(Json(jobs))
}

async fn get_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = run(state.engine, move |e| e.get_job(&JobId::from(id))).await?;
    Ok(Json(job))
}

async fn claim_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ClaimRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let job = run(state.engine, move |e| {
        e.claim_job(&JobId::from(id), &req.editor_id)
    })
    .await?;
    Ok(Json(job))
}

async fn submit_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = payload?;
    let job = run(state.engine, move |e| {
        e.submit_job(&JobId::from(id), &req.submission_url)
    })
    .await?;
    Ok(Json(job))
}

async fn approve_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let approval = run(state.engine, move |e| e.approve_job(&JobId::from(id))).await?;
    Ok(Json(approval))
}

async fn user_stats_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let stats = run(state.engine, move |e| e.user_stats(&id)).await?;
    Ok(Json(stats))
}

async fn pending_credits_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let credits = run(state.engine, |e| e.pending_credits()).await?;
    Ok(Json(credits))
}

async fn reconcile_handler(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let report = run(state.engine, |e| e.reconcile()).await?;
    Ok(Json(report))
}
