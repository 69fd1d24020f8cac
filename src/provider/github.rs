//! GitHub adapter backed by octocrab, authenticated as a GitHub App.
//!
//! The app-level client signs JWTs with the App private key; each call is made
//! through a client scoped to the organization's installation.

use std::time::Duration;

use async_trait::async_trait;
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CommitAuthorSource, PAGE_SIZE, ProviderClient, ProviderError, with_deadline};
use crate::types::{
    CommitAuthor, ExternalRepoId, InstallationId, Organization, ProviderRepository, PullNumber,
};

/// GitHub API client holding App credentials.
#[derive(Clone)]
pub struct GitHubClient {
    app: Octocrab,
    timeout: Duration,
}

impl GitHubClient {
    pub fn new(app: Octocrab, timeout: Duration) -> Self {
        Self { app, timeout }
    }

    /// Builds an App-authenticated client from the App id and its PEM key.
    pub fn from_app_key(
        app_id: u64,
        private_key_pem: &[u8],
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let key = jsonwebtoken::EncodingKey::from_rsa_pem(private_key_pem)
            .map_err(|e| ProviderError::Other(format!("invalid GitHub App private key: {e}")))?;
        let app = Octocrab::builder()
            .app(octocrab::models::AppId(app_id), key)
            .build()
            .map_err(ProviderError::from_octocrab)?;
        Ok(Self::new(app, timeout))
    }

    fn installation(&self, id: InstallationId) -> Result<Octocrab, ProviderError> {
        self.app
            .installation(octocrab::models::InstallationId(id.0))
            .map_err(ProviderError::from_octocrab)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ProviderClient for GitHubClient {
    async fn list_organization_repositories(
        &self,
        organization: &Organization,
    ) -> Result<Vec<ProviderRepository>, ProviderError> {
        let installation_id = organization
            .installation_id
            .ok_or_else(|| ProviderError::NotInstalled(organization.name.clone()))?;
        let client = self.installation(installation_id)?;

        with_deadline(
            self.timeout,
            "list installation repositories",
            list_installation_repositories(&client, &organization.name),
        )
        .await
    }
}

#[async_trait]
impl CommitAuthorSource for GitHubClient {
    async fn commit_authors(
        &self,
        installation: InstallationId,
        repository: ExternalRepoId,
        pull: PullNumber,
    ) -> Result<Vec<CommitAuthor>, ProviderError> {
        let client = self.installation(installation)?;
        with_deadline(
            self.timeout,
            "list pull request commits",
            pull_request_authors(&client, repository, pull),
        )
        .await
    }
}

#[derive(Debug, Serialize)]
struct PageParams {
    per_page: usize,
    page: u32,
}

#[derive(Debug, Deserialize)]
struct InstallationRepositories {
    repositories: Vec<RawRepository>,
}

#[derive(Debug, Deserialize)]
struct RawRepository {
    id: u64,
    name: String,
    full_name: String,
    html_url: Option<String>,
    owner: RawOwner,
}

#[derive(Debug, Deserialize)]
struct RawOwner {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawPullCommit {
    sha: String,
    author: Option<RawUser>,
    commit: RawCommit,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    id: u64,
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    author: Option<RawGitAuthor>,
}

#[derive(Debug, Deserialize)]
struct RawGitAuthor {
    name: Option<String>,
    email: Option<String>,
}

/// Pages through `/installation/repositories`, keeping those owned by
/// `organization_name`.
async fn list_installation_repositories(
    client: &Octocrab,
    organization_name: &str,
) -> Result<Vec<ProviderRepository>, ProviderError> {
    let mut page = 1u32;
    let mut all = Vec::new();

    loop {
        let params = PageParams {
            per_page: PAGE_SIZE,
            page,
        };
        let result: Result<InstallationRepositories, _> = client
            .get("/installation/repositories", Some(&params))
            .await;

        match result {
            Ok(page_result) => {
                let items = page_result.repositories;
                let is_last_page = items.len() < PAGE_SIZE;

                all.extend(
                    items
                        .into_iter()
                        .filter(|r| r.owner.login.eq_ignore_ascii_case(organization_name))
                        .map(|r| ProviderRepository {
                            external_id: ExternalRepoId(r.id),
                            url: r
                                .html_url
                                .unwrap_or_else(|| format!("https://github.com/{}", r.full_name)),
                            name: r.name,
                            full_name: r.full_name,
                        }),
                );

                if is_last_page {
                    break;
                }
                page += 1;
            }
            Err(e) => return Err(ProviderError::from_octocrab(e)),
        }
    }

    debug!(
        organization = %organization_name,
        count = all.len(),
        "Listed installation repositories"
    );
    Ok(all)
}

async fn pull_request_authors(
    client: &Octocrab,
    repository: ExternalRepoId,
    pull: PullNumber,
) -> Result<Vec<CommitAuthor>, ProviderError> {
    let repo: RawRepository = client
        .get(format!("/repositories/{}", repository.0), None::<&()>)
        .await
        .map_err(ProviderError::from_octocrab)?;

    let route = format!(
        "/repos/{}/{}/pulls/{}/commits",
        repo.owner.login, repo.name, pull.0
    );

    let mut page = 1u32;
    let mut authors = Vec::new();
    loop {
        let params = PageParams {
            per_page: PAGE_SIZE,
            page,
        };
        let commits: Vec<RawPullCommit> = client
            .get(&route, Some(&params))
            .await
            .map_err(ProviderError::from_octocrab)?;
        let is_last_page = commits.len() < PAGE_SIZE;

        authors.extend(commits.into_iter().filter_map(to_commit_author));

        if is_last_page {
            break;
        }
        page += 1;
    }

    Ok(authors)
}

/// Resolves a commit's author from the GitHub user, falling back to the git
/// author fields. Returns `None` (with a warning) when neither is present.
fn to_commit_author(commit: RawPullCommit) -> Option<CommitAuthor> {
    let git_author = commit.commit.author;
    match (commit.author, git_author) {
        (None, None) => {
            warn!(sha = %commit.sha, "Commit has no resolvable author");
            None
        }
        (user, git) => {
            let (name, email) = git.map(|g| (g.name, g.email)).unwrap_or_default();
            Some(CommitAuthor {
                sha: commit.sha,
                id: user.as_ref().map(|u| u.id),
                login: user.map(|u| u.login),
                name,
                email,
            })
        }
    }
}
