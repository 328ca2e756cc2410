//! Build callback DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::domain::build::BuildStatus;

/// Completion callback body posted by the executor
///
/// Idempotent per build id: the first terminal status wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompleteBuild {
    pub status: BuildStatus,
    /// Concrete version each output ended up publishing
    #[serde(default)]
    pub outputs: Vec<OutputVersion>,
}

/// One published resource version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputVersion {
    pub resource: String,
    pub version: HashMap<String, serde_json::Value>,
}
