//! Build submission endpoint

use capstan_core::dto::executor::ExecutorBuild;
use reqwest::StatusCode;

use crate::error::{ClientError, Result};
use crate::ExecutorClient;

impl ExecutorClient {
    /// Submit a build for execution
    ///
    /// The executor acknowledges acceptance with `201 Created`; any other
    /// status is reported as `BadResponse`. Progress arrives out-of-band
    /// through the callback and logs URLs carried in the request.
    pub async fn execute(&self, build: &ExecutorBuild) -> Result<()> {
        let url = format!("{}/builds", self.base_url);
        let response = self.client.post(&url).json(build).send().await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(ClientError::BadResponse {
                status: status.as_u16(),
            });
        }

        Ok(())
    }
}
