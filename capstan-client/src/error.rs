//! Error types for the executor client

use thiserror::Error;

/// Result type alias for executor client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the executor
#[derive(Debug, Error)]
pub enum ClientError {
    /// The HTTP request itself failed
    #[error("executor request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// The executor answered with something other than Created
    #[error("bad executor response (status {status})")]
    BadResponse {
        /// HTTP status code the executor returned
        status: u16,
    },
}

impl ClientError {
    /// Check whether this error is a rejected submission
    pub fn is_bad_response(&self) -> bool {
        matches!(self, Self::BadResponse { .. })
    }
}
