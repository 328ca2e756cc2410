//! Executor request DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Build request submitted to the executor
///
/// The executor fetches each input into its `destination_path`, runs the
/// build, delivers each output from its `source_path`, POSTs the final state
/// to `callback`, and streams events into the websocket at `logs_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorBuild {
    pub privileged: bool,
    pub inputs: Vec<ExecutorInput>,
    pub outputs: Vec<ExecutorOutput>,
    pub callback: String,
    pub logs_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorInput {
    #[serde(rename = "type")]
    pub input_type: String,
    pub source: HashMap<String, serde_json::Value>,
    pub destination_path: String,
    /// Path of the build's config file within this input, when it lives here
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorOutput {
    #[serde(rename = "type")]
    pub output_type: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    pub source_path: String,
}
