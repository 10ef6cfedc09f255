use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Response, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde_json::json;
use tokio::fs;
use tracing::warn;

use crate::{
    artifact_store::resolve_video_request,
    error::PipelineError,
    models::{SubmitAcceptedResponse, SubmitRequest},
    pipeline::SubmitError,
    AppState,
};

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response<Body> {
    (
        status,
        Json(json!({
            "error": {
                "code": code,
                "message": message.into()
            }
        })),
    )
        .into_response()
}

pub async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "timestamp": Utc::now() }))
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(payload): Json<SubmitRequest>,
) -> impl IntoResponse {
    let record = match state.pipeline.submit(&payload.text).await {
        Ok(record) => record,
        Err(SubmitError::Rejected(err @ PipelineError::InvalidInput { too_long: true, .. })) => {
            return error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "SCRIPT_TOO_LONG",
                err.public_message(),
            );
        }
        Err(SubmitError::Rejected(err)) => {
            return error_response(StatusCode::BAD_REQUEST, err.code(), err.public_message());
        }
        Err(SubmitError::QueueUnavailable) => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "QUEUE_UNAVAILABLE",
                "Job queue is unavailable.",
            );
        }
    };

    let response = SubmitAcceptedResponse {
        job_id: record.job_id,
        status: record.status,
        progress: record.progress,
        message: record.message,
        created_at: record.created_at,
    };

    (StatusCode::ACCEPTED, Json(response)).into_response()
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    match state.pipeline.store().get(&job_id).await {
        Ok(job) => (StatusCode::OK, Json(job.to_response())).into_response(),
        Err(_) => error_response(StatusCode::NOT_FOUND, "JOB_NOT_FOUND", "Job not found."),
    }
}

pub async fn download_video(
    State(state): State<AppState>,
    Path(file_name): Path<String>,
) -> impl IntoResponse {
    let Some(path) = resolve_video_request(&state.config.storage_root, &file_name) else {
        return error_response(StatusCode::NOT_FOUND, "VIDEO_NOT_FOUND", "Video not found.");
    };

    let bytes = match fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return error_response(
                StatusCode::NOT_FOUND,
                "VIDEO_NOT_FOUND",
                "Video not found or expired.",
            );
        }
        Err(err) => {
            warn!("Failed reading video {}: {err}", path.display());
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "VIDEO_READ_FAILED",
                "Failed to read video.",
            );
        }
    };

    let content_disposition = format!("attachment; filename=\"{file_name}\"");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_DISPOSITION, content_disposition)
        .body(Body::from(bytes))
        .unwrap_or_else(|_| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "RESPONSE_BUILD_FAILED",
                "Failed to build download response.",
            )
        })
}
