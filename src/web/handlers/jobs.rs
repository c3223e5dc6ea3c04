//! # Job Handlers
//!
//! Submission, status and results endpoints used by clients.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use tracing::{debug, info};

use crate::messaging::{JobResultsReport, JobStatusReport, JobSubmission, SubmissionReceipt};
use crate::web::response_types::ApiResult;
use crate::web::state::AppState;

/// Submit a job: POST /api/jobs
///
/// Answers 202 once the job is persisted; distribution continues in the background.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(submission): Json<JobSubmission>,
) -> ApiResult<(StatusCode, Json<SubmissionReceipt>)> {
    info!(
        session_id = %submission.session_id,
        lines = submission.lines.len(),
        "Job submission received"
    );
    let receipt = state.orchestrator.submit_job(submission).await?;
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// Job status: GET /api/jobs/:session_id
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<JobStatusReport>> {
    debug!(session_id = %session_id, "Status query");
    Ok(Json(state.orchestrator.job_status(&session_id).await?))
}

/// Job results: GET /api/jobs/:session_id/results
pub async fn get_job_results(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<JobResultsReport>> {
    Ok(Json(state.orchestrator.job_results(&session_id).await?))
}
