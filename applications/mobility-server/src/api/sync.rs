/// Sync API routes
use crate::{
    error::{Result, ServerError},
    state::AppState,
};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use mobility_core::{JobId, RunId, StoragePath, SyncStatusResponse};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Deserialize)]
pub struct StartSyncRequest {
    /// Overrides the job's destination, `s3://bucket/prefix` or `bucket/prefix`
    pub destination: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartSyncResponse {
    pub job_id: JobId,
    pub run_id: RunId,
}

#[derive(Debug, Serialize)]
pub struct CancelSyncResponse {
    pub cancelled: bool,
}

async fn ensure_job(app_state: &AppState, job_id: &JobId) -> Result<()> {
    match app_state.jobs.get_job(job_id).await? {
        Some(_) => Ok(()),
        None => Err(ServerError::NotFound(format!("Job not found: {job_id}"))),
    }
}

/// POST /api/jobs/:id/sync
/// Start a mirror run in the background; the body is optional
pub async fn start_sync(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<(StatusCode, Json<StartSyncResponse>)> {
    let request: StartSyncRequest = if body.iter().all(u8::is_ascii_whitespace) {
        StartSyncRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ServerError::BadRequest(format!("invalid request body: {e}")))?
    };

    let destination = request
        .destination
        .as_deref()
        .map(str::parse::<StoragePath>)
        .transpose()?;

    let job_id = JobId::new(id);
    ensure_job(&app_state, &job_id).await?;

    // The run reports through the job record; its handle is not awaited here
    let (run_id, _handle) = app_state.manager.start_sync(job_id.clone(), destination);
    tracing::info!("Accepted sync of job {} as run {}", job_id, run_id);

    Ok((
        StatusCode::ACCEPTED,
        Json(StartSyncResponse { job_id, run_id }),
    ))
}

/// POST /api/jobs/:id/sync/cancel
pub async fn cancel_sync(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<CancelSyncResponse>> {
    let job_id = JobId::new(id);
    ensure_job(&app_state, &job_id).await?;

    let cancelled = app_state.manager.cancel_sync(&job_id);
    Ok(Json(CancelSyncResponse { cancelled }))
}

/// GET /api/jobs/:id/sync/status
pub async fn sync_status(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SyncStatusResponse>> {
    let job_id = JobId::new(id);

    app_state
        .manager
        .get_status(&job_id)
        .await?
        .map(Json)
        .ok_or_else(|| ServerError::NotFound(format!("Job not found: {job_id}")))
}
