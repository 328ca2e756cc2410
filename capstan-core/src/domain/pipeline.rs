//! Pipeline domain types

use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;

/// A saved pipeline: one team's named configuration
///
/// `config_version` increases monotonically with every saved config;
/// `ordering` is a total order within the owning team. Builds of a public
/// pipeline are visible to every team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: i64,
    pub team_id: i64,
    pub name: String,
    pub config: PipelineConfig,
    pub config_version: i64,
    pub paused: bool,
    pub public: bool,
    pub ordering: i32,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
