//! Single-entity organization operations.
//!
//! One [`OrganizationService`] exists per provider. Each operation validates
//! its input, propagates the first error it hits, and records an audit event
//! once the change is made.
//!
//! # Operations
//!
//! - [`OrganizationService::list_organizations`]: the reconciled view
//! - [`OrganizationService::add_organization`]: create-only registration
//! - [`OrganizationService::update_organization`]: auto-enable and branch
//!   protection settings
//! - [`OrganizationService::delete_organization`]: disable repositories, then
//!   delete the record
//!
//! Signature approval lists live in [`approval`].

pub mod approval;
pub mod oauth;

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditEvent, AuditLog};
use crate::directory::ProjectDirectory;
use crate::error::ServiceError;
use crate::reconcile::Reconciler;
use crate::store::{BulkDisableReport, OrganizationStore, RepositoryStore, StoreError};
use crate::types::{
    ClaGroupId, Organization, OrganizationSettings, ProjectOrganizationView, ProjectSfid, Provider,
};

pub use approval::{ApprovalListRequest, ApprovalListService};
pub use oauth::GitLabAuthorization;

/// Body of an organization registration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddOrganizationRequest {
    #[serde(default, alias = "organizationName")]
    pub organization_name: Option<String>,
    #[serde(default, alias = "autoEnabled")]
    pub auto_enabled: Option<bool>,
    #[serde(
        default,
        alias = "autoEnabledClaGroupID",
        alias = "autoEnabledClaGroupId"
    )]
    pub auto_enabled_cla_group_id: Option<String>,
    #[serde(default, alias = "branchProtectionEnabled")]
    pub branch_protection_enabled: Option<bool>,
}

/// Body of a settings update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateOrganizationRequest {
    #[serde(default, alias = "autoEnabled")]
    pub auto_enabled: Option<bool>,
    #[serde(
        default,
        alias = "autoEnabledClaGroupID",
        alias = "autoEnabledClaGroupId"
    )]
    pub auto_enabled_cla_group_id: Option<String>,
    #[serde(default, alias = "branchProtectionEnabled")]
    pub branch_protection_enabled: Option<bool>,
}

fn validate_settings(
    auto_enabled: Option<bool>,
    cla_group_id: Option<String>,
    branch_protection_enabled: bool,
) -> Result<OrganizationSettings, ServiceError> {
    let auto_enabled =
        auto_enabled.ok_or_else(|| ServiceError::validation("auto_enabled is required"))?;
    let cla_group_id = cla_group_id
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .map(ClaGroupId::new);
    if auto_enabled && cla_group_id.is_none() {
        return Err(ServiceError::validation(
            "auto_enabled_cla_group_id cannot be empty when auto_enabled is set",
        ));
    }
    Ok(OrganizationSettings {
        auto_enabled,
        auto_enabled_cla_group_id: cla_group_id,
        branch_protection_enabled,
    })
}

impl AddOrganizationRequest {
    fn validate(self) -> Result<(String, OrganizationSettings), ServiceError> {
        let name = self
            .organization_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| ServiceError::validation("organization_name is required"))?;
        let settings = validate_settings(
            self.auto_enabled,
            self.auto_enabled_cla_group_id,
            self.branch_protection_enabled.unwrap_or(false),
        )?;
        Ok((name, settings))
    }
}

#[derive(Clone)]
pub struct OrganizationService {
    provider: Provider,
    organizations: Arc<dyn OrganizationStore>,
    repositories: Arc<dyn RepositoryStore>,
    projects: Arc<dyn ProjectDirectory>,
    audit: Arc<dyn AuditLog>,
    reconciler: Reconciler,
}

impl OrganizationService {
    pub fn new(
        provider: Provider,
        organizations: Arc<dyn OrganizationStore>,
        repositories: Arc<dyn RepositoryStore>,
        projects: Arc<dyn ProjectDirectory>,
        audit: Arc<dyn AuditLog>,
        reconciler: Reconciler,
    ) -> Self {
        Self {
            provider,
            organizations,
            repositories,
            projects,
            audit,
            reconciler,
        }
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub async fn list_organizations(
        &self,
        project_sfid: &ProjectSfid,
    ) -> Result<ProjectOrganizationView, ServiceError> {
        self.reconciler.reconcile(project_sfid).await
    }

    pub async fn add_organization(
        &self,
        actor: &str,
        project_sfid: &ProjectSfid,
        request: AddOrganizationRequest,
    ) -> Result<Organization, ServiceError> {
        let (name, settings) = request.validate()?;
        let parent = self.projects.parent_project(project_sfid).await?;

        if let Some(existing) = self.organizations.get_organization_by_name(&name).await? {
            warn!(
                organization = %name,
                project_sfid = %project_sfid,
                existing_project = %existing.project_sfid,
                "Organization name already registered"
            );
            return Err(ServiceError::AlreadyExists(format!(
                "{} organization {} is already registered",
                self.provider, existing.name
            )));
        }

        let organization = Organization::new(
            self.provider,
            name,
            project_sfid.clone(),
            parent,
            settings,
            Utc::now(),
        );
        self.organizations
            .put_organization(&organization)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists { .. } => ServiceError::AlreadyExists(format!(
                    "{} organization {} is already registered",
                    self.provider, organization.name
                )),
                other => other.into(),
            })?;

        info!(
            organization = %organization.name,
            organization_id = %organization.id,
            project_sfid = %project_sfid,
            parent_project_sfid = %organization.parent_project_sfid,
            provider = %self.provider,
            "Organization added"
        );

        self.audit
            .record(
                AuditEntry::new(
                    actor,
                    AuditEvent::OrganizationAdded {
                        provider: self.provider,
                        organization_name: organization.name.clone(),
                        auto_enabled: organization.settings.auto_enabled,
                        auto_enabled_cla_group_id: organization
                            .settings
                            .auto_enabled_cla_group_id
                            .clone(),
                        branch_protection_enabled: organization.settings.branch_protection_enabled,
                    },
                )
                .project(project_sfid),
            )
            .await;

        Ok(organization)
    }

    pub async fn update_organization(
        &self,
        actor: &str,
        project_sfid: &ProjectSfid,
        name: &str,
        request: UpdateOrganizationRequest,
    ) -> Result<Organization, ServiceError> {
        let current = self.registered(project_sfid, name).await?;
        let settings = validate_settings(
            request.auto_enabled,
            request.auto_enabled_cla_group_id,
            request
                .branch_protection_enabled
                .unwrap_or(current.settings.branch_protection_enabled),
        )?;

        let updated = self
            .organizations
            .update_settings(&current.id, &settings)
            .await?;

        info!(
            organization = %updated.name,
            project_sfid = %project_sfid,
            auto_enabled = settings.auto_enabled,
            "Organization settings updated"
        );

        self.audit
            .record(
                AuditEntry::new(
                    actor,
                    AuditEvent::OrganizationUpdated {
                        provider: self.provider,
                        organization_name: updated.name.clone(),
                        auto_enabled: settings.auto_enabled,
                        auto_enabled_cla_group_id: settings.auto_enabled_cla_group_id.clone(),
                        branch_protection_enabled: settings.branch_protection_enabled,
                    },
                )
                .project(project_sfid),
            )
            .await;

        Ok(updated)
    }

    /// Disables the organization's repositories (best-effort) and then
    /// deletes its record.
    pub async fn delete_organization(
        &self,
        actor: &str,
        project_sfid: &ProjectSfid,
        name: &str,
    ) -> Result<BulkDisableReport, ServiceError> {
        let organization = self.registered(project_sfid, name).await?;

        let report = self
            .repositories
            .disable_repositories_of_organization(self.provider, &organization.name)
            .await?;
        if !report.is_complete() {
            warn!(
                organization = %organization.name,
                failed = report.failed.len(),
                "Some repositories could not be disabled"
            );
        }

        self.organizations
            .delete_organization(&organization.id)
            .await?;

        info!(
            organization = %organization.name,
            project_sfid = %project_sfid,
            repositories_disabled = report.disabled.len(),
            "Organization deleted"
        );

        self.audit
            .record(
                AuditEntry::new(
                    actor,
                    AuditEvent::OrganizationDeleted {
                        provider: self.provider,
                        organization_name: organization.name.clone(),
                        repositories_disabled: report.disabled.len(),
                    },
                )
                .project(project_sfid),
            )
            .await;

        Ok(report)
    }

    /// The organization named `name`, if it is registered under this project.
    async fn registered(
        &self,
        project_sfid: &ProjectSfid,
        name: &str,
    ) -> Result<Organization, ServiceError> {
        self.organizations
            .get_organization_by_name(name)
            .await?
            .filter(|org| &org.project_sfid == project_sfid)
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "{} organization {name} in project {project_sfid}",
                    self.provider
                ))
            })
    }
}
