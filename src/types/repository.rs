//! Repository records and provider-side repository listings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ClaGroupId, ExternalRepoId, ProjectSfid, RepositoryId};
use super::organization::Provider;

/// A repository registered locally under an organization and CLA group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub id: RepositoryId,
    pub external_id: ExternalRepoId,
    pub name: String,
    pub full_name: String,
    pub url: String,
    pub organization_name: String,
    pub cla_group_id: ClaGroupId,
    pub project_sfid: ProjectSfid,
    pub parent_project_sfid: ProjectSfid,
    pub provider: Provider,
    pub enabled: bool,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
}

/// A repository as the provider reports it for an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderRepository {
    pub external_id: ExternalRepoId,
    pub name: String,
    pub full_name: String,
    pub url: String,
}

impl ProviderRepository {
    pub fn new(external_id: u64, name: impl Into<String>) -> Self {
        let name = name.into();
        ProviderRepository {
            external_id: ExternalRepoId(external_id),
            full_name: name.clone(),
            url: String::new(),
            name,
        }
    }
}
