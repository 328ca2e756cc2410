//! Team Repository
//!
//! Handles all database operations related to teams. Name lookups are
//! case-insensitive; credential blobs are stored as nullable JSONB and each
//! update touches exactly one blob.

use capstan_core::domain::team::{BasicAuth, GitHubAuth, OidcAuth, Team};
use sqlx::PgPool;

/// Create a new team
pub async fn create(pool: &PgPool, name: &str) -> Result<Team, sqlx::Error> {
    let row = sqlx::query_as::<_, TeamRow>(
        r#"
        INSERT INTO teams (name)
        VALUES ($1)
        RETURNING id, name, basic_auth, github_auth, oidc_auth, created_at
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(row.into())
}

/// Find a team by name, case-insensitively
pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Team>, sqlx::Error> {
    let row = sqlx::query_as::<_, TeamRow>(
        r#"
        SELECT id, name, basic_auth, github_auth, oidc_auth, created_at
        FROM teams
        WHERE LOWER(name) = LOWER($1)
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Replace the basic-auth blob, leaving the other blobs untouched
pub async fn update_basic_auth(
    pool: &PgPool,
    name: &str,
    auth: Option<&BasicAuth>,
) -> Result<Option<Team>, sqlx::Error> {
    let row = sqlx::query_as::<_, TeamRow>(
        r#"
        UPDATE teams
        SET basic_auth = $2
        WHERE LOWER(name) = LOWER($1)
        RETURNING id, name, basic_auth, github_auth, oidc_auth, created_at
        "#,
    )
    .bind(name)
    .bind(auth.map(|a| serde_json::to_value(a).unwrap()))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Replace the GitHub-auth blob, leaving the other blobs untouched
pub async fn update_github_auth(
    pool: &PgPool,
    name: &str,
    auth: Option<&GitHubAuth>,
) -> Result<Option<Team>, sqlx::Error> {
    let row = sqlx::query_as::<_, TeamRow>(
        r#"
        UPDATE teams
        SET github_auth = $2
        WHERE LOWER(name) = LOWER($1)
        RETURNING id, name, basic_auth, github_auth, oidc_auth, created_at
        "#,
    )
    .bind(name)
    .bind(auth.map(|a| serde_json::to_value(a).unwrap()))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// Replace the OIDC-auth blob, leaving the other blobs untouched
pub async fn update_oidc_auth(
    pool: &PgPool,
    name: &str,
    auth: Option<&OidcAuth>,
) -> Result<Option<Team>, sqlx::Error> {
    let row = sqlx::query_as::<_, TeamRow>(
        r#"
        UPDATE teams
        SET oidc_auth = $2
        WHERE LOWER(name) = LOWER($1)
        RETURNING id, name, basic_auth, github_auth, oidc_auth, created_at
        "#,
    )
    .bind(name)
    .bind(auth.map(|a| serde_json::to_value(a).unwrap()))
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct TeamRow {
    id: i64,
    name: String,
    basic_auth: Option<serde_json::Value>,
    github_auth: Option<serde_json::Value>,
    oidc_auth: Option<serde_json::Value>,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<TeamRow> for Team {
    fn from(row: TeamRow) -> Self {
        Team {
            id: row.id,
            name: row.name,
            basic_auth: row.basic_auth.and_then(|v| serde_json::from_value(v).ok()),
            github_auth: row.github_auth.and_then(|v| serde_json::from_value(v).ok()),
            oidc_auth: row.oidc_auth.and_then(|v| serde_json::from_value(v).ok()),
            created_at: row.created_at,
        }
    }
}
