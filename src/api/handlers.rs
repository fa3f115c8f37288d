//! API route handlers.
//!
//! Thin translation layer between HTTP and [`crate::pipeline::PipelineState`]:
//! parse the request, call into shared state, map the result onto a status
//! code and JSON body.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::warn;

use crate::pipeline::{PipelineError, PipelineState, StartRunParams};
use crate::types::RunMetadata;

#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<PipelineState>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody { error: message.into() })).into_response()
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = match self {
            PipelineError::AlreadyRecording | PipelineError::NoActiveRun => StatusCode::CONFLICT,
            PipelineError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.to_string())
    }
}

/// POST /api/logging/start
pub async fn start_logging(
    State(state): State<ApiState>,
    Json(params): Json<StartRunParams>,
) -> Result<Json<RunMetadata>, PipelineError> {
    let metadata = state.pipeline.start_run(params)?;
    Ok(Json(metadata))
}

/// POST /api/logging/stop
pub async fn stop_logging(State(state): State<ApiState>) -> Result<Json<RunMetadata>, PipelineError> {
    let metadata = state.pipeline.stop_run()?;
    Ok(Json(metadata))
}

/// GET /api/history
pub async fn list_history(State(state): State<ApiState>) -> Response {
    match state.pipeline.history.list_runs() {
        Ok(runs) => Json(runs).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to list run history");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/history/{id}/insights
pub async fn get_insights(State(state): State<ApiState>, Path(run_id): Path<String>) -> Response {
    match state.pipeline.history.get_run_summary_json(&run_id) {
        Ok(Some(bytes)) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "application/json")],
            bytes,
        )
            .into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("no summary for run {run_id}")),
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "failed to read run summary");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// DELETE /api/history/{id}
pub async fn delete_run(State(state): State<ApiState>, Path(run_id): Path<String>) -> Response {
    if state.pipeline.active_run_id().as_deref() == Some(run_id.as_str()) {
        return error_response(StatusCode::CONFLICT, "cannot delete the currently recording run");
    }
    match state.pipeline.history.delete_run(&run_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "failed to delete run");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

/// GET /api/history/{id}/export — newline-delimited JSON, one `ProcessedSample` per line.
pub async fn export_run(State(state): State<ApiState>, Path(run_id): Path<String>) -> Response {
    match state.pipeline.history.export_jsonl(&run_id) {
        Ok(body) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, "application/x-ndjson")],
            body,
        )
            .into_response(),
        Err(e) => {
            warn!(run_id = %run_id, error = %e, "failed to export run");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}
