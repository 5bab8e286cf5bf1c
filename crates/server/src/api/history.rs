//! # History API
//!
//! Read-only views over persisted run directories.

use axum::{
    extract::{Path, State},
    Json,
};

use sdlc_core::state::{ArtifactContent, RunDetail, RunManifest, RunSummary};

use super::{ApiError, SharedState};

/// Every persisted manifest, newest first
#[utoipa::path(
    get,
    path = "/api/runs",
    tag = "history",
    responses((status = 200, description = "Array of run manifests"))
)]
pub async fn list_runs(State(state): State<SharedState>) -> Result<Json<Vec<RunManifest>>, ApiError> {
    Ok(Json(state.history.list_manifests().await?))
}

/// Run summaries, newest first
#[utoipa::path(
    get,
    path = "/api/history",
    tag = "history",
    responses((status = 200, description = "Array of run summaries"))
)]
pub async fn list_history(
    State(state): State<SharedState>,
) -> Result<Json<Vec<RunSummary>>, ApiError> {
    Ok(Json(state.history.summaries().await?))
}

/// Manifest of one run
#[utoipa::path(
    get,
    path = "/api/run/{run_id}",
    tag = "history",
    params(("run_id" = String, Path, description = "Run identifier")),
    responses(
        (status = 200, description = "Run manifest"),
        (status = 404, description = "Unknown run", body = super::ErrorResponse)
    )
)]
pub async fn get_run(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunManifest>, ApiError> {
    Ok(Json(state.history.load_manifest(&run_id).await?))
}

/// Manifest, artifact contents and conversation log of one run
#[utoipa::path(
    get,
    path = "/api/run/{run_id}/detail",
    tag = "history",
    params(("run_id" = String, Path, description = "Run identifier")),
    responses(
        (status = 200, description = "Run detail"),
        (status = 404, description = "Unknown run", body = super::ErrorResponse)
    )
)]
pub async fn get_run_detail(
    State(state): State<SharedState>,
    Path(run_id): Path<String>,
) -> Result<Json<RunDetail>, ApiError> {
    Ok(Json(state.history.load_detail(&run_id).await?))
}

/// One artifact file of a run
#[utoipa::path(
    get,
    path = "/api/artifact/{run_id}/{filename}",
    tag = "history",
    params(
        ("run_id" = String, Path, description = "Run identifier"),
        ("filename" = String, Path, description = "File name inside the run directory")
    ),
    responses(
        (status = 200, description = "File content and name"),
        (status = 404, description = "Unknown run or file", body = super::ErrorResponse)
    )
)]
pub async fn get_artifact(
    State(state): State<SharedState>,
    Path((run_id, filename)): Path<(String, String)>,
) -> Result<Json<ArtifactContent>, ApiError> {
    Ok(Json(state.history.load_artifact(&run_id, &filename).await?))
}
