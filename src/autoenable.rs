//! Auto-enabling repositories that appear in a registered organization.
//!
//! When the provider reports a new repository, the owning organization is
//! looked up by the owner part of the repository's full name. If that
//! organization has auto-enable on with a CLA group, the repository is
//! registered under that group (or an earlier, disabled record of it is
//! re-enabled).

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use crate::store::{OrganizationStore, RepositoryStore, StoreError};
use crate::types::{ClaGroupId, Organization, ProviderRepository, Repository, RepositoryId};

#[derive(Debug, Error)]
pub enum AutoEnableError {
    /// Not a failure: the organization does not want the repository enabled.
    #[error("auto-enable is off for {repository}: {reason}")]
    Off { repository: String, reason: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AutoEnableOutcome {
    Created(Repository),
    Reenabled(Repository),
    AlreadyEnabled(Repository),
}

impl AutoEnableOutcome {
    pub fn repository(&self) -> &Repository {
        match self {
            AutoEnableOutcome::Created(r)
            | AutoEnableOutcome::Reenabled(r)
            | AutoEnableOutcome::AlreadyEnabled(r) => r,
        }
    }

    /// Whether anything was written.
    pub fn changed(&self) -> bool {
        !matches!(self, AutoEnableOutcome::AlreadyEnabled(_))
    }
}

/// Owner login from an `owner/name` full name.
fn owner_of(full_name: &str) -> Option<&str> {
    full_name
        .split_once('/')
        .map(|(owner, _)| owner)
        .filter(|owner| !owner.is_empty())
}

#[derive(Clone)]
pub struct AutoEnabler {
    organizations: Arc<dyn OrganizationStore>,
    repositories: Arc<dyn RepositoryStore>,
}

impl AutoEnabler {
    pub fn new(
        organizations: Arc<dyn OrganizationStore>,
        repositories: Arc<dyn RepositoryStore>,
    ) -> Self {
        Self {
            organizations,
            repositories,
        }
    }

    pub async fn enable(
        &self,
        repository: &ProviderRepository,
    ) -> Result<AutoEnableOutcome, AutoEnableError> {
        let off = |reason: &str| AutoEnableError::Off {
            repository: repository.full_name.clone(),
            reason: reason.to_string(),
        };

        let owner = owner_of(&repository.full_name).ok_or_else(|| off("no owner in full name"))?;
        let organization = self
            .organizations
            .get_organization_by_name(owner)
            .await?
            .ok_or_else(|| off("organization is not registered"))?;
        if !organization.enabled {
            return Err(off("organization is disabled"));
        }
        let cla_group = organization
            .settings
            .auto_enable_target()
            .cloned()
            .ok_or_else(|| off("auto-enable is not configured"))?;

        let existing = self
            .repositories
            .get_repositories_by_organization(organization.provider, &organization.name)
            .await?
            .into_iter()
            .find(|r| r.external_id == repository.external_id);

        let outcome = match existing {
            Some(record) if record.enabled => {
                debug!(repository = %record.full_name, "Repository already enabled");
                AutoEnableOutcome::AlreadyEnabled(record)
            }
            Some(mut record) => {
                self.repositories
                    .enable_repository(&record.id, &cla_group)
                    .await?;
                record.enabled = true;
                record.cla_group_id = cla_group;
                record.date_modified = Utc::now();
                AutoEnableOutcome::Reenabled(record)
            }
            None => {
                let record = new_record(&organization, repository, cla_group);
                self.repositories.put_repository(&record).await?;
                AutoEnableOutcome::Created(record)
            }
        };

        if outcome.changed() {
            let record = outcome.repository();
            info!(
                repository = %record.full_name,
                external_id = %record.external_id,
                organization = %organization.name,
                cla_group_id = %record.cla_group_id,
                "Repository auto-enabled"
            );
        }
        Ok(outcome)
    }
}

fn new_record(
    organization: &Organization,
    repository: &ProviderRepository,
    cla_group: ClaGroupId,
) -> Repository {
    let now = Utc::now();
    Repository {
        id: RepositoryId::new(uuid::Uuid::new_v4().to_string()),
        external_id: repository.external_id,
        name: repository.name.clone(),
        full_name: repository.full_name.clone(),
        url: repository.url.clone(),
        organization_name: organization.name.clone(),
        cla_group_id: cla_group,
        project_sfid: organization.project_sfid.clone(),
        parent_project_sfid: organization.parent_project_sfid.clone(),
        provider: organization.provider,
        enabled: true,
        date_created: now,
        date_modified: now,
    }
}
