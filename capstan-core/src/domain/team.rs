//! Team domain types

use serde::{Deserialize, Serialize};

/// A tenancy scope
///
/// Teams own pipelines and one-off builds; every storage query is predicated
/// on the requesting team. Names are unique under case-folding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub basic_auth: Option<BasicAuth>,
    pub github_auth: Option<GitHubAuth>,
    pub oidc_auth: Option<OidcAuth>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Basic credentials
///
/// The password field holds the bcrypt hash once the blob has been saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl BasicAuth {
    /// A blob with either half blank is stored as null
    pub fn is_blank(&self) -> bool {
        self.username.is_empty() || self.password.is_empty()
    }
}

/// GitHub OAuth credentials with authorization lists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubAuth {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub organizations: Vec<String>,
    #[serde(default)]
    pub users: Vec<String>,
}

impl GitHubAuth {
    /// A blob with either half blank is stored as null
    pub fn is_blank(&self) -> bool {
        self.client_id.is_empty() || self.client_secret.is_empty()
    }
}

/// Generic OIDC provider credentials
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OidcAuth {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl OidcAuth {
    /// A blob with either half blank is stored as null
    pub fn is_blank(&self) -> bool {
        self.client_id.is_empty() || self.client_secret.is_empty()
    }
}
