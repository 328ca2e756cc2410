//! Capstan Executor Client
//!
//! A small, type-safe HTTP client for the external executor that actually
//! runs builds. The engine hands it a fully materialized build request; the
//! executor acknowledges with `201 Created` and later reports back through
//! the callback URLs embedded in the request.

pub mod error;
mod builds;

pub use error::{ClientError, Result};

use reqwest::Client;

/// HTTP client for the executor API
#[derive(Debug, Clone)]
pub struct ExecutorClient {
    /// Base URL of the executor (e.g., "http://localhost:9000")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl ExecutorClient {
    /// Create a new executor client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the executor API
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    /// Create a new executor client with a custom HTTP client
    ///
    /// This allows the caller to configure timeouts, proxies, TLS settings,
    /// etc. The engine uses it to apply the ambient dispatch timeout.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the executor
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = ExecutorClient::new("http://localhost:9000");
        assert_eq!(client.base_url(), "http://localhost:9000");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ExecutorClient::new("http://localhost:9000/");
        assert_eq!(client.base_url(), "http://localhost:9000");
    }

    #[test]
    fn test_client_with_custom_client() {
        let http_client = Client::new();
        let client = ExecutorClient::with_client("http://localhost:9000", http_client);
        assert_eq!(client.base_url(), "http://localhost:9000");
    }
}
