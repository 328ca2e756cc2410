//! Input Resolver
//!
//! Computes, for one job, the concrete resource version bound to every
//! referenced resource: overrides win outright, `passed` constraints are
//! answered by the versions that exited a succeeded build of every named
//! upstream job, and the most recent common version is bound. Resources only
//! referenced through outputs keep their base version.

use std::collections::HashMap;

use capstan_core::config::{JobConfig, Resources};
use capstan_core::domain::preparation::PreparationStatus;
use sqlx::PgPool;

use crate::repository::{build_repository, preparation_repository};

/// Resolution error type
#[derive(Debug)]
pub enum InputError {
    UnknownResource(String),
    UnsatisfiedInput {
        resource: String,
        passed: Vec<String>,
    },
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for InputError {
    fn from(err: sqlx::Error) -> Self {
        InputError::DatabaseError(err)
    }
}

/// Bind a concrete version to every resource the job references
///
/// Deterministic: the same storage state and the same overrides always
/// produce the same resource map.
pub async fn resolve(
    pool: &PgPool,
    pipeline_id: i64,
    job: &JobConfig,
    base: &Resources,
    overrides: &Resources,
) -> Result<Resources, InputError> {
    let mut resources = base.clone();

    for input in &job.inputs {
        if let Some(resource) = overrides.lookup(&input.resource) {
            resources.update(resource.clone());
            continue;
        }

        let resource = base
            .lookup(&input.resource)
            .ok_or_else(|| InputError::UnknownResource(input.resource.clone()))?;

        let Some(passed) = &input.passed else {
            continue;
        };

        let versions =
            build_repository::common_output_versions(pool, pipeline_id, passed, &input.resource)
                .await?;

        let Some(version) = versions.last() else {
            return Err(InputError::UnsatisfiedInput {
                resource: input.resource.clone(),
                passed: passed.clone(),
            });
        };

        let mut resource = resource.clone();
        resource.source = version.clone();
        resources.update(resource);
    }

    Ok(resources)
}

/// Record the resolver's verdict on the build's preparation snapshot
pub async fn record_preparation(
    pool: &PgPool,
    build_id: i64,
    job: &JobConfig,
) -> Result<(), sqlx::Error> {
    let inputs: HashMap<String, PreparationStatus> = job
        .inputs
        .iter()
        .map(|input| (input.resource.clone(), PreparationStatus::NotBlocking))
        .collect();

    preparation_repository::update_inputs(pool, build_id, &inputs, PreparationStatus::NotBlocking)
        .await
}
