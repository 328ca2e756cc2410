use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create teams table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS teams (
            id BIGSERIAL PRIMARY KEY,
            name TEXT NOT NULL,
            basic_auth JSONB,
            github_auth JSONB,
            oidc_auth JSONB,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Team names are unique under case-folding
    sqlx::query(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_teams_lower_name ON teams (LOWER(name))",
    )
    .execute(pool)
    .await?;

    // Create pipelines table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS pipelines (
            id BIGSERIAL PRIMARY KEY,
            team_id BIGINT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            config JSONB NOT NULL,
            version BIGINT NOT NULL DEFAULT 1,
            paused BOOLEAN NOT NULL DEFAULT false,
            public BOOLEAN NOT NULL DEFAULT false,
            ordering INTEGER NOT NULL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
            UNIQUE (team_id, name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create builds table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS builds (
            id BIGSERIAL PRIMARY KEY,
            team_id BIGINT NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
            pipeline_id BIGINT REFERENCES pipelines(id) ON DELETE CASCADE,
            job_name TEXT,
            name TEXT NOT NULL,
            status VARCHAR(20) NOT NULL,
            completed BOOLEAN NOT NULL DEFAULT false,
            created_at TIMESTAMPTZ NOT NULL DEFAULT now()
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_builds_team_id ON builds(team_id)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_builds_pipeline_job ON builds(pipeline_id, job_name)",
    )
    .execute(pool)
    .await?;

    // Create build events table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS build_events (
            build_id BIGINT NOT NULL REFERENCES builds(id) ON DELETE CASCADE,
            event_id BIGINT NOT NULL,
            type TEXT NOT NULL,
            version TEXT NOT NULL,
            payload JSONB NOT NULL,
            PRIMARY KEY (build_id, event_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create build outputs table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS build_outputs (
            id BIGSERIAL PRIMARY KEY,
            build_id BIGINT NOT NULL REFERENCES builds(id) ON DELETE CASCADE,
            resource_name TEXT NOT NULL,
            version JSONB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_build_outputs_resource ON build_outputs(resource_name)",
    )
    .execute(pool)
    .await?;

    // Create build preparation table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS build_preparation (
            build_id BIGINT PRIMARY KEY REFERENCES builds(id) ON DELETE CASCADE,
            paused_pipeline VARCHAR(20) NOT NULL DEFAULT 'unknown',
            paused_job VARCHAR(20) NOT NULL DEFAULT 'unknown',
            max_running_builds VARCHAR(20) NOT NULL DEFAULT 'unknown',
            inputs JSONB NOT NULL DEFAULT '{}',
            inputs_satisfied VARCHAR(20) NOT NULL DEFAULT 'unknown'
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
