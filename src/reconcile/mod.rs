//! Reconciliation of provider-visible, locally registered and configured
//! state into a [`ProjectOrganizationView`].
//!
//! For each organization of a project, the provider listing, the local
//! repository records and the auto-enable CLA group name are fetched
//! concurrently; organizations themselves are processed with bounded,
//! order-preserving parallelism. The merge itself is the pure
//! [`classify::classify_organization`].
//!
//! # Failure handling
//!
//! - A provider listing failure marks that organization `connection_failure`
//!   and is logged; the other organizations are unaffected.
//! - A failure reading one organization's local repositories is handled the
//!   same way.
//! - A CLA group name lookup failure leaves the name empty and is logged.
//! - Only a failure listing the project's organizations fails the call.

pub mod classify;

use std::collections::HashSet;
use std::sync::Arc;

use futures::{StreamExt, stream};
use tracing::{debug, warn};

use crate::directory::ClaGroupDirectory;
use crate::error::ServiceError;
use crate::provider::ProviderClient;
use crate::store::{OrganizationStore, RepositoryStore};
use crate::types::{Organization, ProjectOrganizationView, ProjectSfid};

pub use classify::{OrganizationInput, ProviderListing, build_view, classify_organization};

/// Maximum organizations gathered at once.
pub const RECONCILE_CONCURRENCY: usize = 8;

#[derive(Clone)]
pub struct Reconciler {
    organizations: Arc<dyn OrganizationStore>,
    repositories: Arc<dyn RepositoryStore>,
    provider: Arc<dyn ProviderClient>,
    cla_groups: Arc<dyn ClaGroupDirectory>,
}

impl Reconciler {
    pub fn new(
        organizations: Arc<dyn OrganizationStore>,
        repositories: Arc<dyn RepositoryStore>,
        provider: Arc<dyn ProviderClient>,
        cla_groups: Arc<dyn ClaGroupDirectory>,
    ) -> Self {
        Self {
            organizations,
            repositories,
            provider,
            cla_groups,
        }
    }

    pub async fn reconcile(
        &self,
        project_sfid: &ProjectSfid,
    ) -> Result<ProjectOrganizationView, ServiceError> {
        let organizations = self
            .organizations
            .list_organizations_by_project(project_sfid)
            .await?;
        let organizations = dedupe_by_name(organizations);

        debug!(
            project_sfid = %project_sfid,
            organizations = organizations.len(),
            "Reconciling organizations"
        );

        let inputs: Vec<OrganizationInput> = stream::iter(organizations)
            .map(|org| self.gather(org))
            .buffered(RECONCILE_CONCURRENCY)
            .collect()
            .await;

        Ok(build_view(project_sfid.clone(), inputs))
    }

    async fn gather(&self, organization: Organization) -> OrganizationInput {
        let (listing, local, cla_group_name) = tokio::join!(
            self.listing(&organization),
            self.repositories
                .get_repositories_by_organization(organization.provider, &organization.name),
            self.cla_group_name(&organization),
        );

        let (listing, local) = match local {
            Ok(local) => (listing, local),
            Err(e) => {
                warn!(
                    organization = %organization.name,
                    provider = %organization.provider,
                    error = %e,
                    "Loading local repositories failed"
                );
                (
                    ProviderListing::Failed(format!("local repositories unavailable: {e}")),
                    Vec::new(),
                )
            }
        };

        OrganizationInput {
            organization,
            cla_group_name,
            listing,
            local,
        }
    }

    async fn listing(&self, organization: &Organization) -> ProviderListing {
        if !organization.has_installation() {
            return ProviderListing::NoInstallation;
        }
        match self
            .provider
            .list_organization_repositories(organization)
            .await
        {
            Ok(repos) => ProviderListing::Listed(repos),
            Err(e) => {
                warn!(
                    organization = %organization.name,
                    provider = %organization.provider,
                    error = %e,
                    "Listing organization repositories failed"
                );
                ProviderListing::Failed(e.to_string())
            }
        }
    }

    async fn cla_group_name(&self, organization: &Organization) -> Option<String> {
        let group = organization.settings.auto_enabled_cla_group_id.as_ref()?;
        match self.cla_groups.cla_group_name(group).await {
            Ok(name) => name,
            Err(e) => {
                warn!(
                    organization = %organization.name,
                    cla_group_id = %group,
                    error = %e,
                    "Looking up auto-enabled CLA group name failed"
                );
                None
            }
        }
    }
}

/// Keeps the first record per lowercase name.
fn dedupe_by_name(organizations: Vec<Organization>) -> Vec<Organization> {
    let mut seen = HashSet::new();
    organizations
        .into_iter()
        .filter(|org| {
            let first = seen.insert(org.name_lower.clone());
            if !first {
                warn!(organization = %org.name, id = %org.id, "Skipping duplicate organization record");
            }
            first
        })
        .collect()
}
