//! Build API Handlers
//!
//! Build creation, the executor's completion callback, and the preparation
//! snapshot.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use capstan_core::config::Resources;
use capstan_core::domain::build::Build;
use capstan_core::domain::preparation::BuildPreparation;
use capstan_core::dto::build::CompleteBuild;
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::bus::build_events_channel;
use crate::repository::{
    build_repository, pipeline_repository, preparation_repository, team_repository,
};
use crate::service::builder::BuildError;

/// POST /teams/{team}/builds
/// Create a one-off build owned by the team
pub async fn create_one_off_build(
    State(state): State<AppState>,
    Path(team): Path<String>,
) -> ApiResult<(StatusCode, Json<Build>)> {
    let team = team_repository::find_by_name(&state.pool, &team)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Team {} not found", team)))?;

    let build = build_repository::create_one_off_build(&state.pool, team.id).await?;

    tracing::info!(
        "Created one-off build {} for team {}",
        build.id,
        build.team_name
    );

    Ok((StatusCode::CREATED, Json(build)))
}

/// Per-call resource overrides accepted by the trigger endpoint
#[derive(Debug, Default, Deserialize)]
pub struct TriggerBuildRequest {
    #[serde(default)]
    pub resources: Resources,
}

/// POST /teams/{team}/pipelines/{pipeline}/jobs/{job}/builds
/// Resolve the job's inputs and dispatch one build to the executor
pub async fn trigger_job_build(
    State(state): State<AppState>,
    Path((team, pipeline, job)): Path<(String, String, String)>,
    Json(request): Json<TriggerBuildRequest>,
) -> ApiResult<(StatusCode, Json<Build>)> {
    let team = team_repository::find_by_name(&state.pool, &team)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Team {} not found", team)))?;

    let pipeline = pipeline_repository::find_by_name(&state.pool, team.id, &pipeline)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Pipeline {} not found", pipeline)))?;

    let job = pipeline
        .config
        .lookup_job(&job)
        .ok_or_else(|| ApiError::NotFound(format!("Job {} not found", job)))?
        .clone();

    let build = state
        .builder
        .build(&pipeline, &job, &request.resources)
        .await
        .map_err(|e| match e {
            BuildError::UnknownResource(name) => {
                ApiError::BadRequest(format!("Unknown resource: {}", name))
            }
            BuildError::UnsatisfiedInput { resource, passed } => ApiError::BadRequest(format!(
                "Unsatisfied input: {}; depends on {:?}",
                resource, passed
            )),
            BuildError::BadExecutorResponse(status) => {
                ApiError::InternalError(format!("Bad executor response: {}", status))
            }
            BuildError::ExecutorUnreachable(err) => {
                ApiError::InternalError(format!("Executor unreachable: {}", err))
            }
            BuildError::NotFound(id) => ApiError::NotFound(format!("Build {} not found", id)),
            BuildError::DatabaseError(err) => ApiError::DatabaseError(err),
        })?;

    Ok((StatusCode::CREATED, Json(build)))
}

/// POST /jobs/{job}/builds/{id}
/// Completion callback: record outputs and flip the terminal status
pub async fn complete_build(
    State(state): State<AppState>,
    Path((_job, id)): Path<(String, i64)>,
    Json(request): Json<CompleteBuild>,
) -> ApiResult<StatusCode> {
    if !request.status.is_terminal() {
        return Err(ApiError::BadRequest(format!(
            "Status {:?} is not terminal",
            request.status
        )));
    }

    if build_repository::find_by_id(&state.pool, id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Build {} not found", id)));
    }

    // First terminal status wins; a replayed callback is a no-op.
    let finished = build_repository::finish(&state.pool, id, request.status).await?;
    if finished {
        for output in &request.outputs {
            build_repository::save_output(&state.pool, id, &output.resource, &output.version)
                .await?;
        }

        tracing::info!("Build {} completed with status {:?}", id, request.status);
    }

    state.bus.notify(&build_events_channel(id)).await?;

    Ok(StatusCode::OK)
}

/// GET /builds/{id}/preparation
/// Snapshot of why the build is or is not yet runnable
pub async fn get_preparation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<BuildPreparation>> {
    let preparation = preparation_repository::find_by_build(&state.pool, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Build {} has no preparation", id)))?;

    Ok(Json(preparation))
}
