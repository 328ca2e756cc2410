//! Build Dispatcher
//!
//! Translates a resolved job into an executor request: create the pending
//! build row, wire the completion and log-ingest callback URLs keyed by
//! (job, build id), and POST the request. A dispatch the executor does not
//! accept marks the build errored instead of leaving the row pending.

use std::collections::HashSet;

use capstan_client::{ClientError, ExecutorClient};
use capstan_core::config::{JobConfig, ResourceConfig, Resources};
use capstan_core::domain::build::{Build, BuildStatus};
use capstan_core::domain::pipeline::Pipeline;
use capstan_core::dto::executor::{ExecutorBuild, ExecutorInput, ExecutorOutput};
use sqlx::PgPool;

use crate::repository::build_repository;
use crate::service::input_service;
use crate::service::inputs::InputError;

/// Dispatch error type
#[derive(Debug)]
pub enum BuildError {
    NotFound(i64),
    UnknownResource(String),
    UnsatisfiedInput {
        resource: String,
        passed: Vec<String>,
    },
    BadExecutorResponse(u16),
    ExecutorUnreachable(ClientError),
    DatabaseError(sqlx::Error),
}

impl From<sqlx::Error> for BuildError {
    fn from(err: sqlx::Error) -> Self {
        BuildError::DatabaseError(err)
    }
}

impl From<InputError> for BuildError {
    fn from(err: InputError) -> Self {
        match err {
            InputError::UnknownResource(name) => BuildError::UnknownResource(name),
            InputError::UnsatisfiedInput { resource, passed } => {
                BuildError::UnsatisfiedInput { resource, passed }
            }
            InputError::DatabaseError(err) => BuildError::DatabaseError(err),
        }
    }
}

impl From<ClientError> for BuildError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::BadResponse { status } => BuildError::BadExecutorResponse(status),
            other => BuildError::ExecutorUnreachable(other),
        }
    }
}

/// Turns resolved jobs into dispatched builds
#[derive(Clone)]
pub struct Builder {
    pool: PgPool,
    executor: ExecutorClient,
    external_url: String,
}

impl Builder {
    pub fn new(pool: PgPool, executor: ExecutorClient, external_url: impl Into<String>) -> Self {
        let external_url = external_url.into();
        Self {
            pool,
            executor,
            external_url: external_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create and dispatch one build of `job`
    ///
    /// Order matters: the build row exists before the executor learns its
    /// callback URLs, and a rejected dispatch transitions the row to errored
    /// rather than leaving it pending.
    pub async fn build(
        &self,
        pipeline: &Pipeline,
        job: &JobConfig,
        overrides: &Resources,
    ) -> Result<Build, BuildError> {
        let resources = input_service::resolve(
            &self.pool,
            pipeline.id,
            job,
            &pipeline.config.resources,
            overrides,
        )
        .await?;

        let inputs = compute_inputs(job, &resources)?;
        let outputs = compute_outputs(job, &resources)?;

        let build = build_repository::create_job_build(&self.pool, pipeline.id, &job.name).await?;

        input_service::record_preparation(&self.pool, build.id, job).await?;

        let callback = self.completion_url(&job.name, build.id);
        let logs_url = self.logs_url(&job.name, build.id);

        tracing::debug!("Dispatching build {} (callback: {})", build.id, callback);

        let request = ExecutorBuild {
            privileged: job.privileged,
            inputs,
            outputs,
            callback,
            logs_url,
        };

        if let Err(err) = self.executor.execute(&request).await {
            tracing::error!("Executor rejected build {}: {}", build.id, err);
            build_repository::finish(&self.pool, build.id, BuildStatus::Errored).await?;
            return Err(err.into());
        }

        build_repository::start(&self.pool, build.id).await?;

        tracing::info!("Build {} dispatched for job {}", build.id, job.name);

        build_repository::find_by_id(&self.pool, build.id)
            .await?
            .ok_or(BuildError::NotFound(build.id))
    }

    fn completion_url(&self, job: &str, build_id: i64) -> String {
        format!("{}/jobs/{}/builds/{}", self.external_url, job, build_id)
    }

    fn logs_url(&self, job: &str, build_id: i64) -> String {
        format!(
            "{}/jobs/{}/builds/{}/events",
            self.external_url.replacen("http", "ws", 1),
            job,
            build_id
        )
    }
}

/// Every input the executor must fetch: the job's declared inputs, plus any
/// output-only resources so their trees exist for delivery
fn compute_inputs(job: &JobConfig, resources: &Resources) -> Result<Vec<ExecutorInput>, BuildError> {
    let mut inputs = Vec::new();
    let mut added = HashSet::new();

    for input in &job.inputs {
        let resource = resources
            .lookup(&input.resource)
            .ok_or_else(|| BuildError::UnknownResource(input.resource.clone()))?;

        inputs.push(input_for(job, resource));
        added.insert(input.resource.as_str());
    }

    for output in &job.outputs {
        if added.contains(output.resource.as_str()) {
            continue;
        }

        let resource = resources
            .lookup(&output.resource)
            .ok_or_else(|| BuildError::UnknownResource(output.resource.clone()))?;

        inputs.push(input_for(job, resource));
    }

    Ok(inputs)
}

fn input_for(job: &JobConfig, resource: &ResourceConfig) -> ExecutorInput {
    ExecutorInput {
        input_type: resource.resource_type.clone(),
        source: resource.source.clone(),
        destination_path: resource.name.clone(),
        config_path: config_path_for(job.build_config_path.as_deref(), &resource.name),
    }
}

/// Strips the input-resource prefix from the job's build config path, when
/// the path is rooted in that input
fn config_path_for(build_config_path: Option<&str>, resource_name: &str) -> Option<String> {
    let path = build_config_path?;
    let rest = path.strip_prefix(resource_name)?;
    let rest = rest.strip_prefix('/')?;
    Some(rest.to_string())
}

fn compute_outputs(
    job: &JobConfig,
    resources: &Resources,
) -> Result<Vec<ExecutorOutput>, BuildError> {
    let mut outputs = Vec::new();

    for output in &job.outputs {
        let resource = resources
            .lookup(&output.resource)
            .ok_or_else(|| BuildError::UnknownResource(output.resource.clone()))?;

        outputs.push(ExecutorOutput {
            output_type: resource.resource_type.clone(),
            params: output.params.clone(),
            source_path: resource.name.clone(),
        });
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_core::config::{InputConfig, OutputConfig};
    use std::collections::HashMap;

    fn resource(name: &str) -> ResourceConfig {
        ResourceConfig {
            name: name.to_string(),
            resource_type: "git".to_string(),
            source: HashMap::from([(
                "uri".to_string(),
                serde_json::Value::String(format!("https://example.com/{}.git", name)),
            )]),
        }
    }

    fn job_with(inputs: &[&str], outputs: &[&str]) -> JobConfig {
        JobConfig {
            name: "some-job".to_string(),
            inputs: inputs
                .iter()
                .map(|name| InputConfig {
                    resource: name.to_string(),
                    passed: None,
                })
                .collect(),
            outputs: outputs
                .iter()
                .map(|name| OutputConfig {
                    resource: name.to_string(),
                    params: HashMap::new(),
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_config_path_stripped_for_matching_input() {
        assert_eq!(
            config_path_for(Some("repo/build.yml"), "repo"),
            Some("build.yml".to_string())
        );
        assert_eq!(
            config_path_for(Some("repo/ci/build.yml"), "repo"),
            Some("ci/build.yml".to_string())
        );
    }

    #[test]
    fn test_config_path_requires_full_path_component() {
        assert_eq!(config_path_for(Some("repository/build.yml"), "repo"), None);
        assert_eq!(config_path_for(Some("repo"), "repo"), None);
        assert_eq!(config_path_for(Some("other/build.yml"), "repo"), None);
        assert_eq!(config_path_for(None, "repo"), None);
    }

    #[test]
    fn test_compute_inputs_includes_output_only_resources_once() {
        let job = job_with(&["repo"], &["repo", "release"]);
        let resources = Resources::new(vec![resource("repo"), resource("release")]);

        let inputs = compute_inputs(&job, &resources).unwrap();

        let paths: Vec<_> = inputs.iter().map(|i| i.destination_path.as_str()).collect();
        assert_eq!(paths, vec!["repo", "release"]);
    }

    #[test]
    fn test_compute_inputs_unknown_resource() {
        let job = job_with(&["missing"], &[]);
        let resources = Resources::new(vec![resource("repo")]);

        let result = compute_inputs(&job, &resources);
        assert!(matches!(result, Err(BuildError::UnknownResource(name)) if name == "missing"));
    }

    #[test]
    fn test_compute_outputs_carries_params() {
        let mut job = job_with(&[], &["release"]);
        job.outputs[0]
            .params
            .insert("bump".to_string(), serde_json::Value::String("minor".into()));
        let resources = Resources::new(vec![resource("release")]);

        let outputs = compute_outputs(&job, &resources).unwrap();

        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].source_path, "release");
        assert_eq!(
            outputs[0].params.get("bump"),
            Some(&serde_json::Value::String("minor".into()))
        );
    }

    #[tokio::test]
    async fn test_logs_url_swaps_scheme() {
        let builder = Builder::new_for_tests("http://ci.example.com");
        assert_eq!(
            builder.logs_url("unit", 7),
            "ws://ci.example.com/jobs/unit/builds/7/events"
        );

        let builder = Builder::new_for_tests("https://ci.example.com");
        assert_eq!(
            builder.logs_url("unit", 7),
            "wss://ci.example.com/jobs/unit/builds/7/events"
        );
    }

    #[tokio::test]
    async fn test_completion_url() {
        let builder = Builder::new_for_tests("http://ci.example.com/");
        assert_eq!(
            builder.completion_url("unit", 7),
            "http://ci.example.com/jobs/unit/builds/7"
        );
    }

    impl Builder {
        fn new_for_tests(external_url: &str) -> Self {
            Self {
                pool: sqlx::PgPool::connect_lazy("postgres://localhost/unused")
                    .expect("lazy pool"),
                executor: ExecutorClient::new("http://localhost:9000"),
                external_url: external_url.trim_end_matches('/').to_string(),
            }
        }
    }
}
