//! Pipeline Repository
//!
//! Handles all database operations related to pipelines. Only the surface the
//! engine itself needs: saving configurations, team-scoped lookup, and the
//! visibility/pause flags.

use capstan_core::config::PipelineConfig;
use capstan_core::domain::pipeline::Pipeline;
use sqlx::PgPool;

/// Save a pipeline configuration, bumping `version` when it already exists
///
/// A new pipeline is appended to the end of its team's ordering.
pub async fn save_config(
    pool: &PgPool,
    team_id: i64,
    name: &str,
    config: &PipelineConfig,
    paused: bool,
) -> Result<Pipeline, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRow>(
        r#"
        INSERT INTO pipelines (team_id, name, config, paused, ordering)
        VALUES ($1, $2, $3, $4,
                (SELECT COALESCE(MAX(ordering), 0) + 1 FROM pipelines WHERE team_id = $1))
        ON CONFLICT (team_id, name)
        DO UPDATE SET config = EXCLUDED.config,
                      version = pipelines.version + 1,
                      paused = EXCLUDED.paused
        RETURNING id, team_id, name, config, version, paused, public, ordering, created_at
        "#,
    )
    .bind(team_id)
    .bind(name)
    .bind(serde_json::to_value(config).unwrap())
    .bind(paused)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Find a pipeline by name within a team
pub async fn find_by_name(
    pool: &PgPool,
    team_id: i64,
    name: &str,
) -> Result<Option<Pipeline>, sqlx::Error> {
    let row = sqlx::query_as::<_, PipelineRow>(
        r#"
        SELECT id, team_id, name, config, version, paused, public, ordering, created_at
        FROM pipelines
        WHERE team_id = $1 AND name = $2
        "#,
    )
    .bind(team_id)
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Make the pipeline's builds visible to every team
pub async fn reveal(pool: &PgPool, pipeline_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE pipelines SET public = true WHERE id = $1")
        .bind(pipeline_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Make the pipeline's builds visible to its own team only
pub async fn conceal(pool: &PgPool, pipeline_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE pipelines SET public = false WHERE id = $1")
        .bind(pipeline_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Pause the pipeline's scheduling
pub async fn pause(pool: &PgPool, pipeline_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE pipelines SET paused = true WHERE id = $1")
        .bind(pipeline_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Resume the pipeline's scheduling
pub async fn unpause(pool: &PgPool, pipeline_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE pipelines SET paused = false WHERE id = $1")
        .bind(pipeline_id)
        .execute(pool)
        .await?;

    Ok(())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: i64,
    team_id: i64,
    name: String,
    config: serde_json::Value,
    version: i64,
    paused: bool,
    public: bool,
    ordering: i32,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        let config = serde_json::from_value(row.config).unwrap_or_default();

        Pipeline {
            id: row.id,
            team_id: row.team_id,
            name: row.name,
            config,
            config_version: row.version,
            paused: row.paused,
            public: row.public,
            ordering: row.ordering,
            created_at: row.created_at,
        }
    }
}
