//! API module
//!
//! The engine's wire surface: build creation and dispatch, the executor's
//! completion and event-ingestion callbacks, and the build event stream.
//! Authentication and team CRUD live elsewhere; handlers here only enforce
//! the storage layer's tenancy predicates.

pub mod builds;
pub mod error;
pub mod events;

use axum::{
    routing::{get, post},
    Router,
};
use sqlx::PgPool;
use tower_http::trace::TraceLayer;

use crate::bus::NotificationBus;
use crate::service::builder::Builder;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub bus: NotificationBus,
    pub builder: Builder,
}

/// Create the engine router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Build creation
        .route("/teams/{team}/builds", post(builds::create_one_off_build))
        .route(
            "/teams/{team}/pipelines/{pipeline}/jobs/{job}/builds",
            post(builds::trigger_job_build),
        )
        // Executor callbacks
        .route("/jobs/{job}/builds/{id}", post(builds::complete_build))
        .route("/jobs/{job}/builds/{id}/events", get(events::ingest_events))
        // Build introspection
        .route("/builds/{id}/events", get(events::stream_events))
        .route("/builds/{id}/preparation", get(builds::get_preparation))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
