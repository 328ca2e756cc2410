//! Integration tests for input resolution over prior successful builds:
//! `passed` constraints, the most-recent-common tie-break, overrides, and
//! determinism.

mod common;

use std::collections::HashMap;

use capstan_core::config::{
    InputConfig, JobConfig, OutputConfig, PipelineConfig, ResourceConfig, Resources,
};
use capstan_core::domain::build::BuildStatus;
use capstan_core::domain::pipeline::Pipeline;
use capstan_core::domain::preparation::PreparationStatus;
use capstan_engine::repository::{
    build_repository, pipeline_repository, preparation_repository, team_repository,
};
use capstan_engine::service::input_service;
use capstan_engine::service::inputs::InputError;

fn version(v: &str) -> HashMap<String, serde_json::Value> {
    HashMap::from([("ref".to_string(), serde_json::Value::String(v.to_string()))])
}

fn publishing_job(name: &str) -> JobConfig {
    JobConfig {
        name: name.to_string(),
        outputs: vec![OutputConfig {
            resource: "some-resource".to_string(),
            params: HashMap::new(),
        }],
        ..Default::default()
    }
}

fn pipeline_config() -> PipelineConfig {
    PipelineConfig {
        resources: Resources::new(vec![ResourceConfig {
            name: "some-resource".to_string(),
            resource_type: "git".to_string(),
            source: HashMap::from([(
                "uri".to_string(),
                serde_json::Value::String("https://example.com/repo.git".to_string()),
            )]),
        }]),
        jobs: vec![
            publishing_job("job-a"),
            publishing_job("job-b"),
            JobConfig {
                name: "job-c".to_string(),
                inputs: vec![InputConfig {
                    resource: "some-resource".to_string(),
                    passed: Some(vec!["job-a".to_string(), "job-b".to_string()]),
                }],
                ..Default::default()
            },
        ],
    }
}

async fn setup_pipeline(pool: &sqlx::PgPool) -> Pipeline {
    let team = team_repository::create(pool, &common::unique_name("resolver-team"))
        .await
        .expect("create team");
    pipeline_repository::save_config(
        pool,
        team.id,
        &common::unique_name("resolver-pipeline"),
        &pipeline_config(),
        false,
    )
    .await
    .expect("save config")
}

/// One successful build of `job` that published the given versions
async fn publish(pool: &sqlx::PgPool, pipeline_id: i64, job: &str, versions: &[&str]) {
    let build = build_repository::create_job_build(pool, pipeline_id, job)
        .await
        .expect("create job build");
    for v in versions {
        build_repository::save_output(pool, build.id, "some-resource", &version(v))
            .await
            .expect("save output");
    }
    build_repository::finish(pool, build.id, BuildStatus::Succeeded)
        .await
        .expect("finish build");
}

#[tokio::test]
async fn test_passed_constraint_binds_most_recent_common_version() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let pipeline = setup_pipeline(&pool).await;

    publish(&pool, pipeline.id, "job-a", &["v1"]).await;
    publish(&pool, pipeline.id, "job-b", &["v1", "v2"]).await;

    let job = pipeline.config.lookup_job("job-c").unwrap().clone();

    let resolved = input_service::resolve(
        &pool,
        pipeline.id,
        &job,
        &pipeline.config.resources,
        &Resources::default(),
    )
    .await
    .expect("resolve");

    // only v1 has passed through both jobs
    assert_eq!(
        resolved.lookup("some-resource").unwrap().source,
        version("v1")
    );

    // once v2 has passed through both jobs, the tie-break picks it
    publish(&pool, pipeline.id, "job-a", &["v2"]).await;

    let resolved = input_service::resolve(
        &pool,
        pipeline.id,
        &job,
        &pipeline.config.resources,
        &Resources::default(),
    )
    .await
    .expect("resolve after second publish");
    assert_eq!(
        resolved.lookup("some-resource").unwrap().source,
        version("v2")
    );

    // identical storage state and overrides resolve identically
    let again = input_service::resolve(
        &pool,
        pipeline.id,
        &job,
        &pipeline.config.resources,
        &Resources::default(),
    )
    .await
    .expect("resolve again");
    assert_eq!(resolved, again);
}

#[tokio::test]
async fn test_unsatisfied_passed_constraint() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let pipeline = setup_pipeline(&pool).await;

    // job-b never published, so no version passed through both jobs
    publish(&pool, pipeline.id, "job-a", &["v1"]).await;

    let job = pipeline.config.lookup_job("job-c").unwrap().clone();

    let result = input_service::resolve(
        &pool,
        pipeline.id,
        &job,
        &pipeline.config.resources,
        &Resources::default(),
    )
    .await;

    assert!(matches!(
        result,
        Err(InputError::UnsatisfiedInput { resource, .. }) if resource == "some-resource"
    ));
}

#[tokio::test]
async fn test_unknown_resource() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let pipeline = setup_pipeline(&pool).await;

    let job = JobConfig {
        name: "bad-job".to_string(),
        inputs: vec![InputConfig {
            resource: "missing".to_string(),
            passed: None,
        }],
        ..Default::default()
    };

    let result = input_service::resolve(
        &pool,
        pipeline.id,
        &job,
        &pipeline.config.resources,
        &Resources::default(),
    )
    .await;

    assert!(matches!(
        result,
        Err(InputError::UnknownResource(name)) if name == "missing"
    ));
}

#[tokio::test]
async fn test_override_wins_without_consulting_history() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let pipeline = setup_pipeline(&pool).await;

    // no builds exist; only the override makes this resolvable
    let overrides = Resources::new(vec![ResourceConfig {
        name: "some-resource".to_string(),
        resource_type: "git".to_string(),
        source: version("pinned"),
    }]);

    let job = pipeline.config.lookup_job("job-c").unwrap().clone();

    let resolved = input_service::resolve(
        &pool,
        pipeline.id,
        &job,
        &pipeline.config.resources,
        &overrides,
    )
    .await
    .expect("resolve with override");

    assert_eq!(
        resolved.lookup("some-resource").unwrap().source,
        version("pinned")
    );
}

#[tokio::test]
async fn test_resolver_records_preparation() {
    let Some(pool) = common::test_pool().await else {
        return;
    };
    let pipeline = setup_pipeline(&pool).await;

    let build = build_repository::create_job_build(&pool, pipeline.id, "job-c")
        .await
        .expect("create build");

    let job = pipeline.config.lookup_job("job-c").unwrap().clone();
    input_service::record_preparation(&pool, build.id, &job)
        .await
        .expect("record preparation");

    let preparation = preparation_repository::find_by_build(&pool, build.id)
        .await
        .expect("read preparation")
        .expect("preparation exists");

    assert_eq!(
        preparation.inputs.get("some-resource"),
        Some(&PreparationStatus::NotBlocking)
    );
    assert_eq!(preparation.inputs_satisfied, PreparationStatus::NotBlocking);
}
