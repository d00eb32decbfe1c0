//! Batch API handlers.

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path as FsPath, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use streambatch_core::{
    BatchJob, ChannelSink, ConfirmationGate, DirectorySource, FileSink, ItemSource,
    RequestConfirmation, RunContext, SinkError, SourceError,
};

use crate::registry::{BatchStatus, CancelOutcome, Destination};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for a pre-flight count
#[derive(Debug, Deserialize)]
pub struct PreflightBody {
    /// Directory relative to the configured source root.
    #[serde(default)]
    pub input_dir: String,
}

#[derive(Debug, Serialize)]
pub struct PreflightResponse {
    pub item_count: usize,
    pub total_bytes: u64,
    pub within_limits: bool,
}

/// Request body for running a batch
#[derive(Debug, Deserialize)]
pub struct RunBatchBody {
    #[serde(default)]
    pub input_dir: String,
    /// Policy handed to the transformer for every item.
    #[serde(default)]
    pub recipe: String,
    /// Explicit consent to process the pre-flight totals.
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub destination: Destination,
}

/// Response for a batch written server-side
#[derive(Debug, Serialize)]
pub struct BatchAcceptedResponse {
    pub batch_id: String,
    pub location: String,
}

#[derive(Debug, Serialize)]
pub struct ListBatchesResponse {
    pub batches: Vec<BatchStatus>,
    pub total: usize,
}

/// Query parameters for listing batches
#[derive(Debug, Deserialize)]
pub struct ListBatchesParams {
    pub state: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CancelBatchResponse {
    pub batch_id: String,
    pub cancelled: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct BatchErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

type ApiError = (StatusCode, Json<BatchErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(BatchErrorResponse {
            error: message.into(),
            batch_id: None,
        }),
    )
}

/// Resolves a client-supplied directory below `root`.
///
/// Only plain relative components are allowed.
fn resolve_input_dir(root: &FsPath, input_dir: &str) -> Result<PathBuf, ApiError> {
    let relative = FsPath::new(input_dir);
    let escapes = relative.is_absolute()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("input_dir must be a relative path below the source root: {input_dir}"),
        ));
    }
    Ok(root.join(relative))
}

async fn scan_input(state: &AppState, input_dir: &str) -> Result<DirectorySource, ApiError> {
    let path = resolve_input_dir(&state.config().source.root_dir, input_dir)?;
    DirectorySource::scan(&path).await.map_err(|e| match e {
        SourceError::RootNotFound { .. } => api_error(
            StatusCode::NOT_FOUND,
            format!("Input directory not found: {input_dir}"),
        ),
        SourceError::NotADirectory { .. } => api_error(
            StatusCode::BAD_REQUEST,
            format!("Input path is not a directory: {input_dir}"),
        ),
        other => api_error(StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
    })
}

// ============================================================================
// Handlers
// ============================================================================

/// Count the items and bytes a batch would process
pub async fn preflight(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PreflightBody>,
) -> Result<Json<PreflightResponse>, ApiError> {
    let source = scan_input(&state, &body.input_dir).await?;
    let preflight = source.preflight();

    Ok(Json(PreflightResponse {
        item_count: preflight.item_count,
        total_bytes: preflight.total_bytes,
        within_limits: state.limits().allows(&preflight),
    }))
}

/// Start a batch, streaming the archive or writing it server-side
pub async fn run_batch(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RunBatchBody>,
) -> Result<Response, ApiError> {
    let source = scan_input(&state, &body.input_dir).await?;
    let preflight = source.preflight();
    let gate = RequestConfirmation::new(body.confirm, state.limits());
    let batch_id = Uuid::new_v4().to_string();
    let job = BatchJob::new(batch_id.clone(), body.recipe.clone());
    let orchestrator = state.orchestrator();

    if !gate.confirm(&preflight).await {
        // Run anyway so the decline is recorded; the sink is never touched.
        state
            .batches()
            .register(&batch_id, body.destination, preflight.item_count, None)
            .await;
        let (mut sink, _stream) = ChannelSink::new(1);
        let summary = orchestrator
            .run(&job, &source, &mut sink, &gate, RunContext::new())
            .await;
        let message = summary.status_line();
        state.batches().finish(summary).await;

        return Err((
            StatusCode::CONFLICT,
            Json(BatchErrorResponse {
                error: message,
                batch_id: Some(batch_id),
            }),
        ));
    }

    info!(
        batch_id = %batch_id,
        input_dir = %body.input_dir,
        destination = ?body.destination,
        items = preflight.item_count,
        total_bytes = preflight.total_bytes,
        "Starting batch"
    );

    match body.destination {
        Destination::Stream => {
            let (mut sink, stream) = ChannelSink::new(state.config().sink.stream_buffer_chunks);
            let cancel = state
                .batches()
                .register(&batch_id, Destination::Stream, preflight.item_count, None)
                .await;
            let ctx = RunContext::new()
                .with_progress(state.batches().track(&batch_id))
                .with_cancel(cancel);

            let registry = state.batches().clone();
            state.batches().spawn_run(async move {
                let summary = orchestrator.run(&job, &source, &mut sink, &gate, ctx).await;
                registry.finish(summary).await;
            });

            let disposition = format!(
                "attachment; filename=\"{}\"",
                state.config().archive.download_name
            );
            Ok((
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "application/zip".to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                    (HeaderName::from_static("x-batch-id"), batch_id),
                ],
                Body::from_stream(stream),
            )
                .into_response())
        }
        Destination::File => {
            let output_dir = &state.config().sink.output_dir;
            if let Err(e) = tokio::fs::create_dir_all(output_dir).await {
                error!(error = %e, output_dir = %output_dir.display(), "Cannot create output directory");
                return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()));
            }

            let path = output_dir.join(format!("{batch_id}.zip"));
            let mut sink = match FileSink::create(&path).await {
                Ok(sink) => sink,
                Err(e @ SinkError::DestinationExists { .. }) => {
                    warn!(error = %e, "Archive destination already exists");
                    return Err(api_error(StatusCode::CONFLICT, e.to_string()));
                }
                Err(e) => return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
            };

            let location = path.display().to_string();
            let cancel = state
                .batches()
                .register(
                    &batch_id,
                    Destination::File,
                    preflight.item_count,
                    Some(location.clone()),
                )
                .await;
            let ctx = RunContext::new()
                .with_progress(state.batches().track(&batch_id))
                .with_cancel(cancel);

            let registry = state.batches().clone();
            state.batches().spawn_run(async move {
                let summary = orchestrator.run(&job, &source, &mut sink, &gate, ctx).await;
                registry.finish(summary).await;
            });

            Ok((
                StatusCode::ACCEPTED,
                Json(BatchAcceptedResponse { batch_id, location }),
            )
                .into_response())
        }
    }
}

/// List batches, optionally filtered by state
pub async fn list_batches(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListBatchesParams>,
) -> Json<ListBatchesResponse> {
    let batches: Vec<BatchStatus> = state
        .batches()
        .list()
        .await
        .into_iter()
        .filter(|b| {
            params
                .state
                .as_deref()
                .map_or(true, |wanted| b.state.as_str() == wanted)
        })
        .collect();
    let total = batches.len();

    Json(ListBatchesResponse { batches, total })
}

/// Get a batch by ID
pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BatchStatus>, impl IntoResponse> {
    match state.batches().get(&id).await {
        Some(status) => Ok(Json(status)),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Batch not found: {}", id),
        )),
    }
}

/// Cancel a running batch (DELETE endpoint)
pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<CancelBatchResponse>), impl IntoResponse> {
    match state.batches().cancel(&id).await {
        CancelOutcome::Cancelling => Ok((
            StatusCode::ACCEPTED,
            Json(CancelBatchResponse {
                batch_id: id,
                cancelled: true,
            }),
        )),
        CancelOutcome::AlreadyFinished => Err(api_error(
            StatusCode::CONFLICT,
            format!("Batch already finished: {}", id),
        )),
        CancelOutcome::NotFound => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Batch not found: {}", id),
        )),
    }
}
