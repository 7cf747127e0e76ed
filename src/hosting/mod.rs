//! Outbound interface to the source-hosting service.
//!
//! The rest of the crate only sees the [`HostingClient`] trait; the concrete
//! REST implementation lives in [`github`]. Tests substitute fakes or a
//! wiremock-backed client with an overridden base URL.

pub mod github;

use async_trait::async_trait;
use serde::Deserialize;

use crate::errors::AppError;

/// The authenticated account behind a token, plus the scopes it grants.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    pub username: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RepoSummary {
    pub full_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub private: bool,
}

/// `owner/name` pair routing API calls. Never an authorization input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for RepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Capabilities the core consumes from the hosting service.
#[async_trait]
pub trait HostingClient: Send + Sync {
    /// Resolves a token to its account and granted scopes.
    async fn verify_identity(&self, token: &str) -> Result<HostIdentity, AppError>;

    /// Reads the version marker (content sha) of a remote file. `None` means
    /// the file does not exist yet — a create rather than an update.
    async fn get_file_sha(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
    ) -> Result<Option<String>, AppError>;

    /// Creates or updates one file. `prior_sha` must carry the current remote
    /// version marker for updates; a mismatch yields [`AppError::Conflict`].
    async fn put_file(
        &self,
        token: &str,
        repo: &RepoRef,
        path: &str,
        content: &[u8],
        message: &str,
        prior_sha: Option<&str>,
    ) -> Result<(), AppError>;

    /// Most recently updated repositories of the authenticated account.
    async fn list_repositories(
        &self,
        token: &str,
        limit: usize,
    ) -> Result<Vec<RepoSummary>, AppError>;

    /// Whether the repository has at least one commit. Fails with
    /// [`AppError::NotFound`] when the repository itself is missing.
    async fn repo_has_content(&self, token: &str, repo: &RepoRef) -> Result<bool, AppError>;

    /// Writes a placeholder file so that content writes are accepted; the
    /// hosting API rejects writes into a repository with zero history.
    async fn bootstrap_empty_repo(&self, token: &str, repo: &RepoRef) -> Result<(), AppError>;
}
