//! Persistence of organization and repository records.
//!
//! Two traits split the concern the same way the tables are split:
//! [`OrganizationStore`] (one instance per provider table) and
//! [`RepositoryStore`] (a single table shared by all providers). Organization
//! names are only unique within a provider, so every repository query is
//! scoped by [`Provider`].
//!
//! Single-row writes are idempotent. Nothing is coordinated across rows:
//! [`RepositoryStore::disable_repositories_of_organization`] is a loop of
//! independent updates and reports which rows it could not change.
//!
//! # Implementations
//!
//! [`SignatureStore`] covers the one part of a signature this service edits:
//! its GitHub organization approval list.
//!
//! - [`memory`] - in-process maps, used by tests and `CLA_STORE=memory`
//! - [`dynamo`] - DynamoDB tables and secondary indexes

pub mod dynamo;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::types::{
    ClaGroupId, ExternalRepoId, InstallationId, Organization, OrganizationId,
    OrganizationSettings, ProjectSfid, Provider, Repository, RepositoryId, Signature, SignatureId,
};

pub use dynamo::{DynamoOrganizationStore, DynamoRepositoryStore, DynamoSignatureStore};
pub use memory::{MemoryOrganizationStore, MemoryRepositoryStore, MemorySignatureStore};

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The addressed record does not exist.
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    /// A create-only write collided with an existing record.
    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// A stored row could not be decoded.
    #[error("malformed {entity} record: {reason}")]
    Malformed { entity: &'static str, reason: String },

    /// The backing service failed.
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn organization_not_found(key: impl ToString) -> Self {
        StoreError::NotFound {
            entity: "organization",
            key: key.to_string(),
        }
    }

    pub fn repository_not_found(key: impl ToString) -> Self {
        StoreError::NotFound {
            entity: "repository",
            key: key.to_string(),
        }
    }

    pub fn signature_not_found(key: impl ToString) -> Self {
        StoreError::NotFound {
            entity: "signature",
            key: key.to_string(),
        }
    }
}

/// Outcome of a best-effort bulk disable.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BulkDisableReport {
    pub disabled: Vec<RepositoryId>,
    pub failed: Vec<(RepositoryId, String)>,
}

impl BulkDisableReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Picks the record an external-id lookup refers to when several share the
/// id (a repository that moved between organizations keeps its old, disabled
/// record). The enabled record wins; without `enabled_only`, the most recently
/// modified disabled record is the fallback.
pub fn select_by_external_id(
    candidates: impl IntoIterator<Item = Repository>,
    enabled_only: bool,
) -> Option<Repository> {
    candidates
        .into_iter()
        .filter(|r| r.enabled || !enabled_only)
        .max_by(|a, b| {
            a.enabled
                .cmp(&b.enabled)
                .then_with(|| a.date_modified.cmp(&b.date_modified))
                .then_with(|| a.id.cmp(&b.id))
        })
}

/// Organization records for one provider.
#[async_trait]
pub trait OrganizationStore: Send + Sync {
    async fn get_organization(&self, id: &OrganizationId)
    -> Result<Option<Organization>, StoreError>;

    /// Case-insensitive lookup across every project.
    async fn get_organization_by_name(&self, name: &str)
    -> Result<Option<Organization>, StoreError>;

    async fn list_organizations_by_project(
        &self,
        project_sfid: &ProjectSfid,
    ) -> Result<Vec<Organization>, StoreError>;

    /// Create-only. Fails with [`StoreError::AlreadyExists`] if a record with
    /// the same id or lowercase name is present.
    async fn put_organization(&self, organization: &Organization) -> Result<(), StoreError>;

    async fn update_settings(
        &self,
        id: &OrganizationId,
        settings: &OrganizationSettings,
    ) -> Result<Organization, StoreError>;

    async fn set_installation_id(
        &self,
        id: &OrganizationId,
        installation_id: Option<InstallationId>,
    ) -> Result<(), StoreError>;

    /// Stores already-encrypted OAuth credentials.
    async fn update_auth_info(&self, id: &OrganizationId, auth_info: &str)
    -> Result<(), StoreError>;

    async fn delete_organization(&self, id: &OrganizationId) -> Result<(), StoreError>;
}

/// Repository records for all providers.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    async fn get_repositories_by_organization(
        &self,
        provider: Provider,
        organization_name: &str,
    ) -> Result<Vec<Repository>, StoreError>;

    /// See [`select_by_external_id`] for which record is returned.
    async fn get_repository_by_external_id(
        &self,
        provider: Provider,
        external_id: ExternalRepoId,
        enabled_only: bool,
    ) -> Result<Option<Repository>, StoreError>;

    /// Create-only per (provider, organization, external id).
    async fn put_repository(&self, repository: &Repository) -> Result<(), StoreError>;

    /// Re-enables a record, pointing it at `cla_group_id`.
    async fn enable_repository(
        &self,
        id: &RepositoryId,
        cla_group_id: &ClaGroupId,
    ) -> Result<(), StoreError>;

    async fn disable_repository(&self, id: &RepositoryId) -> Result<(), StoreError>;

    /// Disables every enabled repository of the organization, one row at a
    /// time. Per-row failures are logged and reported, not propagated.
    async fn disable_repositories_of_organization(
        &self,
        provider: Provider,
        organization_name: &str,
    ) -> Result<BulkDisableReport, StoreError> {
        let repositories = self
            .get_repositories_by_organization(provider, organization_name)
            .await?;

        let mut report = BulkDisableReport::default();
        for repository in repositories.into_iter().filter(|r| r.enabled) {
            match self.disable_repository(&repository.id).await {
                Ok(()) => report.disabled.push(repository.id),
                Err(e) => {
                    warn!(
                        provider = %provider,
                        organization = %organization_name,
                        repository_id = %repository.id,
                        error = %e,
                        "Failed to disable repository"
                    );
                    report.failed.push((repository.id, e.to_string()));
                }
            }
        }
        Ok(report)
    }
}

/// Signature records, owned by the signing subsystem.
#[async_trait]
pub trait SignatureStore: Send + Sync {
    async fn get_signature(&self, id: &SignatureId) -> Result<Option<Signature>, StoreError>;

    /// Replaces the approval list of an existing signature.
    async fn set_github_org_approval_list(
        &self,
        id: &SignatureId,
        organizations: &[String],
    ) -> Result<(), StoreError>;
}
