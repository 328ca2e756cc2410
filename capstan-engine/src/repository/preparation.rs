//! Build Preparation Repository
//!
//! Snapshot reads and resolver-driven updates of per-build preparation
//! records. The row itself is created alongside the build.

use std::collections::HashMap;

use capstan_core::domain::preparation::{BuildPreparation, PreparationStatus};
use sqlx::PgPool;

/// Read a build's preparation snapshot
pub async fn find_by_build(
    pool: &PgPool,
    build_id: i64,
) -> Result<Option<BuildPreparation>, sqlx::Error> {
    let row = sqlx::query_as::<_, PreparationRow>(
        r#"
        SELECT build_id, paused_pipeline, paused_job, max_running_builds,
               inputs, inputs_satisfied
        FROM build_preparation
        WHERE build_id = $1
        "#,
    )
    .bind(build_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Record the per-input readiness the resolver arrived at
pub async fn update_inputs(
    pool: &PgPool,
    build_id: i64,
    inputs: &HashMap<String, PreparationStatus>,
    inputs_satisfied: PreparationStatus,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE build_preparation
        SET inputs = $2, inputs_satisfied = $3
        WHERE build_id = $1
        "#,
    )
    .bind(build_id)
    .bind(serde_json::to_value(inputs).unwrap())
    .bind(status_to_string(inputs_satisfied))
    .execute(pool)
    .await?;

    Ok(())
}

// =============================================================================
// Helper Functions
// =============================================================================

fn status_to_string(status: PreparationStatus) -> &'static str {
    match status {
        PreparationStatus::Unknown => "unknown",
        PreparationStatus::Blocking => "blocking",
        PreparationStatus::NotBlocking => "not_blocking",
    }
}

fn string_to_status(s: &str) -> PreparationStatus {
    match s {
        "unknown" => PreparationStatus::Unknown,
        "blocking" => PreparationStatus::Blocking,
        "not_blocking" => PreparationStatus::NotBlocking,
        _ => PreparationStatus::Unknown,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PreparationRow {
    build_id: i64,
    paused_pipeline: String,
    paused_job: String,
    max_running_builds: String,
    inputs: serde_json::Value,
    inputs_satisfied: String,
}

impl From<PreparationRow> for BuildPreparation {
    fn from(row: PreparationRow) -> Self {
        let inputs = serde_json::from_value(row.inputs).unwrap_or_default();

        BuildPreparation {
            build_id: row.build_id,
            paused_pipeline: string_to_status(&row.paused_pipeline),
            paused_job: string_to_status(&row.paused_job),
            max_running_builds: string_to_status(&row.max_running_builds),
            inputs,
            inputs_satisfied: string_to_status(&row.inputs_satisfied),
        }
    }
}
