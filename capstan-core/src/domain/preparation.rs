//! Build preparation snapshot

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why a build is or is not yet runnable
///
/// Created atomically with its build and updated as inputs resolve. Readers
/// get a consistent snapshot; staleness up to the next update is fine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildPreparation {
    pub build_id: i64,
    pub paused_pipeline: PreparationStatus,
    pub paused_job: PreparationStatus,
    pub max_running_builds: PreparationStatus,
    pub inputs: HashMap<String, PreparationStatus>,
    pub inputs_satisfied: PreparationStatus,
}

impl BuildPreparation {
    /// The blank snapshot a build starts with
    pub fn new(build_id: i64) -> Self {
        Self {
            build_id,
            paused_pipeline: PreparationStatus::Unknown,
            paused_job: PreparationStatus::Unknown,
            max_running_builds: PreparationStatus::Unknown,
            inputs: HashMap::new(),
            inputs_satisfied: PreparationStatus::Unknown,
        }
    }
}

/// Readiness of one precondition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparationStatus {
    Unknown,
    Blocking,
    NotBlocking,
}
