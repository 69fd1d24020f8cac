//! Source-control provider adapters.
//!
//! The rest of the crate talks to GitHub and GitLab only through the traits
//! in this module:
//!
//! - [`ProviderClient`] lists the repositories an organization's installation
//!   (or OAuth grant) can see; pagination never leaks to callers
//! - [`CommitAuthorSource`] resolves the authors of a pull request's commits
//! - [`TokenExchange`] trades a GitLab OAuth code for credentials, once
//!
//! Every call runs under a deadline ([`with_deadline`]). There is no implicit
//! retry; callers decide.

pub mod cipher;
pub mod error;
pub mod github;
pub mod gitlab;
pub mod oauth;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{
    CommitAuthor, ExternalRepoId, InstallationId, Organization, ProviderRepository, PullNumber,
};

pub use cipher::{CipherError, TokenCipher};
pub use error::ProviderError;
pub use github::GitHubClient;
pub use gitlab::GitLabClient;
pub use oauth::{GitLabOAuth, OAuthCredentials};

/// Page size requested from both providers.
pub const PAGE_SIZE: usize = 100;

#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn list_organization_repositories(
        &self,
        organization: &Organization,
    ) -> Result<Vec<ProviderRepository>, ProviderError>;
}

#[async_trait]
pub trait CommitAuthorSource: Send + Sync {
    async fn commit_authors(
        &self,
        installation: InstallationId,
        repository: ExternalRepoId,
        pull: PullNumber,
    ) -> Result<Vec<CommitAuthor>, ProviderError>;
}

#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<OAuthCredentials, ProviderError>;
}

/// Runs a provider call, failing with [`ProviderError::Unavailable`] once the
/// deadline passes.
pub async fn with_deadline<T, F>(
    deadline: Duration,
    operation: &str,
    call: F,
) -> Result<T, ProviderError>
where
    F: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(ProviderError::unavailable(format!(
            "{operation} exceeded the {}ms deadline",
            deadline.as_millis()
        ))),
    }
}
