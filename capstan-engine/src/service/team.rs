//! Team Service
//!
//! Team creation and credential blob maintenance. Every update touches
//! exactly one blob; a blob with a blank identifier or secret is stored as
//! null, and basic-auth passwords are bcrypt-hashed before they reach
//! storage.

use capstan_core::domain::team::{BasicAuth, GitHubAuth, OidcAuth, Team};
use sqlx::PgPool;

use crate::repository::team_repository;

/// Service error type
#[derive(Debug)]
pub enum TeamError {
    NotFound(String),
    HashError(bcrypt::BcryptError),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for TeamError {
    fn from(err: sqlx::Error) -> Self {
        TeamError::DatabaseError(err)
    }
}

impl From<bcrypt::BcryptError> for TeamError {
    fn from(err: bcrypt::BcryptError) -> Self {
        TeamError::HashError(err)
    }
}

/// Create a team
pub async fn create_team(pool: &PgPool, name: &str) -> Result<Team, TeamError> {
    let team = team_repository::create(pool, name).await?;

    tracing::info!("Team created: {}", team.name);

    Ok(team)
}

/// Get a team by case-insensitive name
pub async fn get_team(pool: &PgPool, name: &str) -> Result<Option<Team>, TeamError> {
    let team = team_repository::find_by_name(pool, name).await?;

    Ok(team)
}

/// Replace the team's basic-auth blob
///
/// The password is hashed here so plaintext never reaches storage.
pub async fn update_basic_auth(
    pool: &PgPool,
    team_name: &str,
    auth: BasicAuth,
) -> Result<Team, TeamError> {
    let stored = if auth.is_blank() {
        None
    } else {
        let password = bcrypt::hash(&auth.password, bcrypt::DEFAULT_COST)?;
        Some(BasicAuth {
            username: auth.username,
            password,
        })
    };

    team_repository::update_basic_auth(pool, team_name, stored.as_ref())
        .await?
        .ok_or_else(|| TeamError::NotFound(team_name.to_string()))
}

/// Replace the team's GitHub-auth blob
pub async fn update_github_auth(
    pool: &PgPool,
    team_name: &str,
    auth: GitHubAuth,
) -> Result<Team, TeamError> {
    let stored = if auth.is_blank() { None } else { Some(auth) };

    team_repository::update_github_auth(pool, team_name, stored.as_ref())
        .await?
        .ok_or_else(|| TeamError::NotFound(team_name.to_string()))
}

/// Replace the team's OIDC-auth blob
pub async fn update_oidc_auth(
    pool: &PgPool,
    team_name: &str,
    auth: OidcAuth,
) -> Result<Team, TeamError> {
    let stored = if auth.is_blank() { None } else { Some(auth) };

    team_repository::update_oidc_auth(pool, team_name, stored.as_ref())
        .await?
        .ok_or_else(|| TeamError::NotFound(team_name.to_string()))
}
