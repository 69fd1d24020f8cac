//! Shared fixtures, fakes and arbitrary generators for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use proptest::prelude::*;

use crate::directory::{DirectoryError, ProjectDirectory};
use crate::provider::{
    CommitAuthorSource, OAuthCredentials, ProviderClient, ProviderError, TokenExchange,
};
use crate::reconcile::{OrganizationInput, ProviderListing};
use crate::types::{
    ClaGroupId, CommitAuthor, ExternalRepoId, InstallationId, Organization, OrganizationSettings,
    ProjectSfid, Provider, ProviderRepository, PullNumber, Repository, RepositoryId,
};

// ─── Fixtures ───

pub fn github_org(name: &str, project: &str) -> Organization {
    Organization::new(
        Provider::Github,
        name,
        ProjectSfid::from(project),
        ProjectSfid::from(project),
        OrganizationSettings {
            auto_enabled: false,
            auto_enabled_cla_group_id: None,
            branch_protection_enabled: false,
        },
        Utc::now(),
    )
}

pub fn installed_github_org(name: &str, project: &str, installation: u64) -> Organization {
    let mut org = github_org(name, project);
    org.installation_id = Some(InstallationId(installation));
    org
}

pub fn auto_enabled_github_org(name: &str, project: &str, cla_group: &str) -> Organization {
    let mut org = installed_github_org(name, project, 1);
    org.settings.auto_enabled = true;
    org.settings.auto_enabled_cla_group_id = Some(ClaGroupId::from(cla_group));
    org
}

pub fn gitlab_org(name: &str, project: &str) -> Organization {
    let mut org = github_org(name, project);
    org.provider = Provider::Gitlab;
    org.auth_state = Some("state-1".to_string());
    org
}

pub fn local_repo(org: &str, external_id: u64, name: &str, enabled: bool) -> Repository {
    let now = Utc::now();
    Repository {
        id: RepositoryId::new(uuid::Uuid::new_v4().to_string()),
        external_id: ExternalRepoId(external_id),
        name: name.to_string(),
        full_name: format!("{org}/{name}"),
        url: format!("https://github.com/{org}/{name}"),
        organization_name: org.to_string(),
        cla_group_id: ClaGroupId::from("cla-group-1"),
        project_sfid: ProjectSfid::from("p1"),
        parent_project_sfid: ProjectSfid::from("p1"),
        provider: Provider::Github,
        enabled,
        date_created: now,
        date_modified: now,
    }
}

pub fn gitlab_repo(group: &str, external_id: u64, name: &str, enabled: bool) -> Repository {
    let mut repo = local_repo(group, external_id, name, enabled);
    repo.provider = Provider::Gitlab;
    repo.url = format!("https://gitlab.com/{group}/{name}");
    repo
}

// ─── Fakes ───

/// Scriptable provider: per-organization listings, per-organization failures
/// and per-pull-request commit authors.
#[derive(Debug, Default)]
pub struct FakeProvider {
    repositories: Mutex<HashMap<String, Vec<ProviderRepository>>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<String, usize>>,
    authors: Mutex<HashMap<(u64, u64), Vec<CommitAuthor>>>,
}

impl FakeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_repositories(&self, org: &str, repos: Vec<ProviderRepository>) {
        self.repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(org.to_lowercase(), repos);
    }

    pub fn fail_for(&self, org: &str) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(org.to_lowercase());
    }

    pub fn calls_for(&self, org: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&org.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    pub fn set_authors(&self, repository: u64, pull: u64, authors: Vec<CommitAuthor>) {
        self.authors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((repository, pull), authors);
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn list_organization_repositories(
        &self,
        organization: &Organization,
    ) -> Result<Vec<ProviderRepository>, ProviderError> {
        let key = organization.name.to_lowercase();
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default() += 1;

        if self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&key)
        {
            return Err(ProviderError::from_status(502, "bad gateway"));
        }
        Ok(self
            .repositories
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl CommitAuthorSource for FakeProvider {
    async fn commit_authors(
        &self,
        _installation: InstallationId,
        repository: ExternalRepoId,
        pull: PullNumber,
    ) -> Result<Vec<CommitAuthor>, ProviderError> {
        self.authors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(repository.0, pull.0))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("pull {pull} of {repository}")))
    }
}

/// Project hierarchy backed by a map; unknown projects are not found.
#[derive(Debug, Default)]
pub struct FakeProjectDirectory {
    parents: HashMap<ProjectSfid, ProjectSfid>,
}

impl FakeProjectDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: &str, parent: &str) -> Self {
        self.parents
            .insert(ProjectSfid::from(project), ProjectSfid::from(parent));
        self
    }
}

#[async_trait]
impl ProjectDirectory for FakeProjectDirectory {
    async fn parent_project(
        &self,
        project_sfid: &ProjectSfid,
    ) -> Result<ProjectSfid, DirectoryError> {
        self.parents
            .get(project_sfid)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(format!("project {project_sfid}")))
    }
}

/// Accepts exactly one code.
#[derive(Debug)]
pub struct FakeTokenExchange {
    pub accepted_code: String,
}

#[async_trait]
impl TokenExchange for FakeTokenExchange {
    async fn exchange_code(&self, code: &str) -> Result<OAuthCredentials, ProviderError> {
        if code == self.accepted_code {
            Ok(OAuthCredentials {
                access_token: "access".into(),
                token_type: "Bearer".into(),
                expires_in: 7200,
                refresh_token: "refresh".into(),
                created_at: 1_700_000_000,
            })
        } else {
            Err(ProviderError::from_status(401, "invalid_grant"))
        }
    }
}

// ─── Strategies ───

pub fn arb_org_name() -> impl Strategy<Value = String> {
    "[a-zA-Z][a-zA-Z0-9-]{0,12}".prop_map(String::from)
}

/// One organization's inputs with unique external ids on each side. Names
/// repeat across ids so sorting ties are exercised.
pub fn arb_organization_input() -> impl Strategy<Value = OrganizationInput> {
    (
        arb_org_name(),
        prop::collection::btree_set(1u64..60, 0..14),
        prop::collection::vec(any::<(bool, bool, bool)>(), 14),
        0u8..5,
    )
        .prop_map(|(org_name, ids, flags, listing_kind)| {
            let mut visible = Vec::new();
            let mut local = Vec::new();
            for (id, (in_provider, in_local, enabled)) in ids.into_iter().zip(flags) {
                let name = format!("repo-{}", id % 5);
                if in_provider {
                    visible.push(ProviderRepository::new(id, name.clone()));
                }
                if in_local {
                    local.push(local_repo(&org_name, id, &name, enabled));
                }
            }

            let (organization, listing) = match listing_kind {
                0 => (github_org(&org_name, "p1"), ProviderListing::NoInstallation),
                1 => (
                    installed_github_org(&org_name, "p1", 9),
                    ProviderListing::Failed("provider unavailable".into()),
                ),
                _ => (
                    installed_github_org(&org_name, "p1", 9),
                    ProviderListing::Listed(visible),
                ),
            };

            OrganizationInput {
                organization,
                cla_group_name: None,
                listing,
                local,
            }
        })
}
