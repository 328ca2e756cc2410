//! Pipeline configuration types
//!
//! The declarative half of the engine: which jobs a pipeline runs, which
//! resources they consume and publish, and which upstream jobs an input must
//! have passed through. Parsing the configuration format is someone else's
//! problem; these are the parsed shapes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A pipeline's full declarative configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub resources: Resources,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl PipelineConfig {
    /// Finds a job by name
    pub fn lookup_job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|job| job.name == name)
    }
}

/// One job: what it consumes, what it publishes, and how it runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    #[serde(default)]
    pub privileged: bool,
    /// Path to the build's own config file, rooted in one of the inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_config_path: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputConfig>,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

/// A job input: which resource, and which upstream jobs it must have passed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputConfig {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<Vec<String>>,
}

/// A job output: which resource it publishes, with delivery params
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    pub resource: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
}

/// A named reference to an external versionable thing
///
/// Within a single resolution the `source` map is rebound to the concrete
/// version chosen for the build.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub source: HashMap<String, serde_json::Value>,
}

/// Resource set with lookup and replace-by-name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resources(Vec<ResourceConfig>);

impl Resources {
    pub fn new(resources: Vec<ResourceConfig>) -> Self {
        Self(resources)
    }

    /// Finds a resource by name
    pub fn lookup(&self, name: &str) -> Option<&ResourceConfig> {
        self.0.iter().find(|resource| resource.name == name)
    }

    /// Replaces the same-named entry, or appends when there is none
    pub fn update(&mut self, resource: ResourceConfig) {
        match self.0.iter_mut().find(|existing| existing.name == resource.name) {
            Some(existing) => *existing = resource,
            None => self.0.push(resource),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResourceConfig> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<ResourceConfig>> for Resources {
    fn from(resources: Vec<ResourceConfig>) -> Self {
        Self(resources)
    }
}
