//! Build domain types

use serde::{Deserialize, Serialize};

/// One execution of a job or one-off task
///
/// Builds belong either to a (team, one-off) or to a (pipeline, job) scope.
/// `id` is globally unique and monotone; `name` is the per-scope sequence
/// rendered as a string. `completed` holds exactly when the status is
/// terminal, and terminal statuses never transition again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Build {
    pub id: i64,
    pub name: String,
    pub team_name: String,
    pub pipeline_name: Option<String>,
    pub job_name: Option<String>,
    pub status: BuildStatus,
    pub completed: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl Build {
    /// Whether this build runs outside any pipeline job
    pub fn is_one_off(&self) -> bool {
        self.job_name.is_none()
    }
}

/// Build lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Pending,
    Started,
    Succeeded,
    Failed,
    Errored,
    Aborted,
}

impl BuildStatus {
    /// Terminal statuses flip the build's completed flag
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BuildStatus::Succeeded
                | BuildStatus::Failed
                | BuildStatus::Errored
                | BuildStatus::Aborted
        )
    }
}
