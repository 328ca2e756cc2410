//! Build Repository
//!
//! Handles all database operations related to builds: creation with
//! per-scope name sequences, team-scoped lookup and listing with opaque page
//! cursors, lifecycle transitions, and the output records that feed input
//! resolution.

use std::collections::HashMap;

use capstan_core::domain::build::{Build, BuildStatus};
use capstan_core::domain::page::{Page, Pagination};
use sqlx::{PgPool, Postgres, Transaction};

/// Create a one-off build owned by `team_id`
///
/// The name is the team's next one-off sequence number; the preparation row
/// is created in the same transaction.
pub async fn create_one_off_build(pool: &PgPool, team_id: i64) -> Result<Build, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO builds (team_id, name, status)
        VALUES ($1,
                (SELECT (COALESCE(MAX(name::integer), 0) + 1)::text
                 FROM builds
                 WHERE team_id = $1 AND pipeline_id IS NULL),
                'pending')
        RETURNING id
        "#,
    )
    .bind(team_id)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO build_preparation (build_id) VALUES ($1)")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let build = find_in_tx(&mut tx, id).await?;

    tx.commit().await?;

    Ok(build)
}

/// Create a build of `job_name` within `pipeline_id`
///
/// The name is the job's next sequence number; the preparation row is
/// created in the same transaction.
pub async fn create_job_build(
    pool: &PgPool,
    pipeline_id: i64,
    job_name: &str,
) -> Result<Build, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO builds (team_id, pipeline_id, job_name, name, status)
        VALUES ((SELECT team_id FROM pipelines WHERE id = $1),
                $1, $2,
                (SELECT (COALESCE(MAX(name::integer), 0) + 1)::text
                 FROM builds
                 WHERE pipeline_id = $1 AND job_name = $2),
                'pending')
        RETURNING id
        "#,
    )
    .bind(pipeline_id)
    .bind(job_name)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO build_preparation (build_id) VALUES ($1)")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    let build = find_in_tx(&mut tx, id).await?;

    tx.commit().await?;

    Ok(build)
}

/// Find a build by id, unscoped
pub async fn find_by_id(pool: &PgPool, id: i64) -> Result<Option<Build>, sqlx::Error> {
    let row = sqlx::query_as::<_, BuildRow>(
        r#"
        SELECT b.id, b.name, b.status, b.completed, b.job_name, b.created_at,
               t.name AS team_name, p.name AS pipeline_name
        FROM builds b
        JOIN teams t ON t.id = b.team_id
        LEFT JOIN pipelines p ON p.id = b.pipeline_id
        WHERE b.id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Find a build by id, strictly within the requesting team
pub async fn find_for_team(
    pool: &PgPool,
    team_id: i64,
    id: i64,
) -> Result<Option<Build>, sqlx::Error> {
    let row = sqlx::query_as::<_, BuildRow>(
        r#"
        SELECT b.id, b.name, b.status, b.completed, b.job_name, b.created_at,
               t.name AS team_name, p.name AS pipeline_name
        FROM builds b
        JOIN teams t ON t.id = b.team_id
        LEFT JOIN pipelines p ON p.id = b.pipeline_id
        WHERE b.team_id = $1 AND b.id = $2
        "#,
    )
    .bind(team_id)
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List the builds visible to `team_id`, newest first, one page at a time
///
/// Visible means the team's own builds plus builds of other teams' public
/// pipelines; with `public_only` set, only the latter. The returned cursors
/// point at the boundary ids of the returned slice and are produced only
/// when an older/newer visible row actually exists.
pub async fn list_for_team(
    pool: &PgPool,
    team_id: i64,
    page: Page,
    public_only: bool,
) -> Result<(Vec<Build>, Pagination), sqlx::Error> {
    let builds: Vec<Build> = if let Some(since) = page.since {
        sqlx::query_as::<_, BuildRow>(
            r#"
            SELECT b.id, b.name, b.status, b.completed, b.job_name, b.created_at,
                   t.name AS team_name, p.name AS pipeline_name
            FROM builds b
            JOIN teams t ON t.id = b.team_id
            LEFT JOIN pipelines p ON p.id = b.pipeline_id
            WHERE (p.public OR (NOT $2 AND b.team_id = $1)) AND b.id < $4
            ORDER BY b.id DESC
            LIMIT $3
            "#,
        )
        .bind(team_id)
        .bind(public_only)
        .bind(page.limit)
        .bind(since)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|r| r.into())
        .collect()
    } else if let Some(until) = page.until {
        let mut rows: Vec<Build> = sqlx::query_as::<_, BuildRow>(
            r#"
            SELECT b.id, b.name, b.status, b.completed, b.job_name, b.created_at,
                   t.name AS team_name, p.name AS pipeline_name
            FROM builds b
            JOIN teams t ON t.id = b.team_id
            LEFT JOIN pipelines p ON p.id = b.pipeline_id
            WHERE (p.public OR (NOT $2 AND b.team_id = $1)) AND b.id > $4
            ORDER BY b.id ASC
            LIMIT $3
            "#,
        )
        .bind(team_id)
        .bind(public_only)
        .bind(page.limit)
        .bind(until)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|r| r.into())
        .collect();

        rows.reverse();
        rows
    } else {
        sqlx::query_as::<_, BuildRow>(
            r#"
            SELECT b.id, b.name, b.status, b.completed, b.job_name, b.created_at,
                   t.name AS team_name, p.name AS pipeline_name
            FROM builds b
            JOIN teams t ON t.id = b.team_id
            LEFT JOIN pipelines p ON p.id = b.pipeline_id
            WHERE (p.public OR (NOT $2 AND b.team_id = $1))
            ORDER BY b.id DESC
            LIMIT $3
            "#,
        )
        .bind(team_id)
        .bind(public_only)
        .bind(page.limit)
        .fetch_all(pool)
        .await?
        .into_iter()
        .map(|r| r.into())
        .collect()
    };

    if builds.is_empty() {
        return Ok((builds, Pagination::default()));
    }
    let max_id = builds[0].id;
    let min_id = builds[builds.len() - 1].id;

    let older_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM builds b
            LEFT JOIN pipelines p ON p.id = b.pipeline_id
            WHERE (p.public OR (NOT $2 AND b.team_id = $1)) AND b.id < $3
        )
        "#,
    )
    .bind(team_id)
    .bind(public_only)
    .bind(min_id)
    .fetch_one(pool)
    .await?;

    let newer_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS (
            SELECT 1 FROM builds b
            LEFT JOIN pipelines p ON p.id = b.pipeline_id
            WHERE (p.public OR (NOT $2 AND b.team_id = $1)) AND b.id > $3
        )
        "#,
    )
    .bind(team_id)
    .bind(public_only)
    .bind(max_id)
    .fetch_one(pool)
    .await?;

    let pagination = Pagination {
        next: older_exists.then(|| Page::since(min_id, page.limit)),
        previous: newer_exists.then(|| Page::until(max_id, page.limit)),
    };

    Ok((builds, pagination))
}

/// Transition a pending build to started; false when it already left pending
pub async fn start(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE builds SET status = 'started' WHERE id = $1 AND status = 'pending'")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Flip the build to a terminal status
///
/// Terminal is monotone: the first terminal status wins and later calls are
/// no-ops, reported by the false return.
pub async fn finish(pool: &PgPool, id: i64, status: BuildStatus) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE builds
        SET status = $2, completed = true
        WHERE id = $1 AND completed = false
        "#,
    )
    .bind(id)
    .bind(status_to_string(status))
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Record a resource version the build published
pub async fn save_output(
    pool: &PgPool,
    build_id: i64,
    resource_name: &str,
    version: &HashMap<String, serde_json::Value>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO build_outputs (build_id, resource_name, version)
        VALUES ($1, $2, $3)
        "#,
    )
    .bind(build_id)
    .bind(resource_name)
    .bind(serde_json::to_value(version).unwrap())
    .execute(pool)
    .await?;

    Ok(())
}

/// Versions of `resource_name` that exited a succeeded build of every one of
/// `job_names`, oldest first; the tie-break between equally common versions
/// is the id of the most recent output record
pub async fn common_output_versions(
    pool: &PgPool,
    pipeline_id: i64,
    job_names: &[String],
    resource_name: &str,
) -> Result<Vec<HashMap<String, serde_json::Value>>, sqlx::Error> {
    let rows: Vec<(serde_json::Value,)> = sqlx::query_as(
        r#"
        SELECT o.version
        FROM build_outputs o
        JOIN builds b ON b.id = o.build_id
        WHERE b.pipeline_id = $1
          AND b.status = 'succeeded'
          AND b.job_name = ANY($2)
          AND o.resource_name = $3
        GROUP BY o.version
        HAVING COUNT(DISTINCT b.job_name) = $4
        ORDER BY MAX(o.id) ASC
        "#,
    )
    .bind(pipeline_id)
    .bind(job_names)
    .bind(resource_name)
    .bind(job_names.len() as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(version,)| serde_json::from_value(version).unwrap_or_default())
        .collect())
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn find_in_tx(tx: &mut Transaction<'_, Postgres>, id: i64) -> Result<Build, sqlx::Error> {
    let row = sqlx::query_as::<_, BuildRow>(
        r#"
        SELECT b.id, b.name, b.status, b.completed, b.job_name, b.created_at,
               t.name AS team_name, p.name AS pipeline_name
        FROM builds b
        JOIN teams t ON t.id = b.team_id
        LEFT JOIN pipelines p ON p.id = b.pipeline_id
        WHERE b.id = $1
        "#,
    )
    .bind(id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(row.into())
}

fn status_to_string(status: BuildStatus) -> &'static str {
    match status {
        BuildStatus::Pending => "pending",
        BuildStatus::Started => "started",
        BuildStatus::Succeeded => "succeeded",
        BuildStatus::Failed => "failed",
        BuildStatus::Errored => "errored",
        BuildStatus::Aborted => "aborted",
    }
}

fn string_to_status(s: &str) -> BuildStatus {
    match s {
        "pending" => BuildStatus::Pending,
        "started" => BuildStatus::Started,
        "succeeded" => BuildStatus::Succeeded,
        "failed" => BuildStatus::Failed,
        "errored" => BuildStatus::Errored,
        "aborted" => BuildStatus::Aborted,
        _ => BuildStatus::Pending,
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct BuildRow {
    id: i64,
    name: String,
    status: String,
    completed: bool,
    job_name: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    team_name: String,
    pipeline_name: Option<String>,
}

impl From<BuildRow> for Build {
    fn from(row: BuildRow) -> Self {
        Build {
            id: row.id,
            name: row.name,
            team_name: row.team_name,
            pipeline_name: row.pipeline_name,
            job_name: row.job_name,
            status: string_to_status(&row.status),
            completed: row.completed,
            created_at: row.created_at,
        }
    }
}
