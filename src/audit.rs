//! Audit events for organization and repository state changes.
//!
//! Each kind of change is a variant of [`AuditEvent`] carrying its own payload,
//! and [`AuditEntry::render`] is the single place that turns one into the
//! human-readable line stored in the events table.
//!
//! Recording is fire-and-forget from the caller's point of view: sinks log
//! their own failures and never fail the operation that produced the event.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::types::{ClaGroupId, ExternalRepoId, InstallationId, ProjectSfid, Provider};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    RepositoryAdded {
        provider: Provider,
        repository_name: String,
        external_id: ExternalRepoId,
    },
    RepositoryDisabled {
        provider: Provider,
        repository_name: String,
        external_id: ExternalRepoId,
    },
    OrganizationAdded {
        provider: Provider,
        organization_name: String,
        auto_enabled: bool,
        auto_enabled_cla_group_id: Option<ClaGroupId>,
        branch_protection_enabled: bool,
    },
    OrganizationUpdated {
        provider: Provider,
        organization_name: String,
        auto_enabled: bool,
        auto_enabled_cla_group_id: Option<ClaGroupId>,
        branch_protection_enabled: bool,
    },
    OrganizationDeleted {
        provider: Provider,
        organization_name: String,
        repositories_disabled: usize,
    },
    OrganizationAuthorized {
        organization_name: String,
    },
    InstallationChanged {
        organization_name: String,
        installation_id: Option<InstallationId>,
    },
    ApprovalListGithubOrganizationAdded {
        organization_name: String,
    },
    ApprovalListGithubOrganizationDeleted {
        organization_name: String,
    },
}

impl AuditEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::RepositoryAdded { .. } => "repository_added",
            AuditEvent::RepositoryDisabled { .. } => "repository_disabled",
            AuditEvent::OrganizationAdded { .. } => "organization_added",
            AuditEvent::OrganizationUpdated { .. } => "organization_updated",
            AuditEvent::OrganizationDeleted { .. } => "organization_deleted",
            AuditEvent::OrganizationAuthorized { .. } => "organization_authorized",
            AuditEvent::InstallationChanged { .. } => "installation_changed",
            AuditEvent::ApprovalListGithubOrganizationAdded { .. } => {
                "approval_list_github_organization_added"
            }
            AuditEvent::ApprovalListGithubOrganizationDeleted { .. } => {
                "approval_list_github_organization_deleted"
            }
        }
    }
}

/// An event plus who caused it and where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub actor: String,
    pub project_sfid: Option<ProjectSfid>,
    pub cla_group_id: Option<ClaGroupId>,
    pub company_id: Option<String>,
    pub event: AuditEvent,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(actor: impl Into<String>, event: AuditEvent) -> Self {
        Self {
            actor: actor.into(),
            project_sfid: None,
            cla_group_id: None,
            company_id: None,
            event,
            recorded_at: Utc::now(),
        }
    }

    pub fn project(mut self, project_sfid: &ProjectSfid) -> Self {
        self.project_sfid = Some(project_sfid.clone());
        self
    }

    pub fn cla_group(mut self, cla_group_id: &ClaGroupId) -> Self {
        self.cla_group_id = Some(cla_group_id.clone());
        self
    }

    pub fn company(mut self, company_id: &str) -> Self {
        self.company_id = Some(company_id.to_string());
        self
    }

    pub fn render(&self) -> String {
        let user = &self.actor;
        let project = self
            .project_sfid
            .as_ref()
            .map(ProjectSfid::as_str)
            .unwrap_or("unknown");
        let group = self
            .cla_group_id
            .as_ref()
            .map(ClaGroupId::as_str)
            .unwrap_or("unknown");
        let company = self.company_id.as_deref().unwrap_or("unknown");

        match &self.event {
            AuditEvent::RepositoryAdded {
                provider,
                repository_name,
                ..
            } => format!(
                "user [{user}] added {provider} repository [{repository_name}] to project [{project}]"
            ),
            AuditEvent::RepositoryDisabled {
                provider,
                repository_name,
                ..
            } => format!(
                "user [{user}] disabled {provider} repository [{repository_name}] in project [{project}]"
            ),
            AuditEvent::OrganizationAdded {
                provider,
                organization_name,
                auto_enabled,
                branch_protection_enabled,
                ..
            } => format!(
                "user [{user}] added {provider} organization [{organization_name}] to project [{project}] \
                 with auto-enabled [{auto_enabled}] and branch protection [{branch_protection_enabled}]"
            ),
            AuditEvent::OrganizationUpdated {
                provider,
                organization_name,
                auto_enabled,
                auto_enabled_cla_group_id,
                branch_protection_enabled,
            } => format!(
                "user [{user}] updated {provider} organization [{organization_name}]: \
                 auto-enabled [{auto_enabled}], auto-enabled CLA group [{}], branch protection [{branch_protection_enabled}]",
                auto_enabled_cla_group_id
                    .as_ref()
                    .map(ClaGroupId::as_str)
                    .unwrap_or("")
            ),
            AuditEvent::OrganizationDeleted {
                provider,
                organization_name,
                repositories_disabled,
            } => format!(
                "user [{user}] deleted {provider} organization [{organization_name}] from project [{project}], \
                 disabling {repositories_disabled} repositories"
            ),
            AuditEvent::OrganizationAuthorized { organization_name } => format!(
                "user [{user}] stored gitlab oauth credentials for organization [{organization_name}]"
            ),
            AuditEvent::InstallationChanged {
                organization_name,
                installation_id: Some(id),
            } => format!(
                "user [{user}] installed the github app on organization [{organization_name}] (installation [{id}])"
            ),
            AuditEvent::InstallationChanged {
                organization_name,
                installation_id: None,
            } => format!(
                "user [{user}] uninstalled the github app from organization [{organization_name}]"
            ),
            AuditEvent::ApprovalListGithubOrganizationAdded { organization_name } => format!(
                "user [{user}] added github organization [{organization_name}] to the approval list \
                 for cla group [{group}] company [{company}]"
            ),
            AuditEvent::ApprovalListGithubOrganizationDeleted { organization_name } => format!(
                "user [{user}] removed github organization [{organization_name}] from the approval list \
                 for cla group [{group}] company [{company}]"
            ),
        }
    }
}

/// Sink for audit entries.
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

/// Writes entries to the tracing log only.
#[derive(Debug, Default, Clone)]
pub struct TracingAuditLog;

#[async_trait]
impl AuditLog for TracingAuditLog {
    async fn record(&self, entry: AuditEntry) {
        info!(
            target: "audit",
            event_type = entry.event.kind(),
            actor = %entry.actor,
            project_sfid = entry.project_sfid.as_ref().map(ProjectSfid::as_str).unwrap_or(""),
            "{}",
            entry.render()
        );
    }
}

/// Keeps entries in memory for inspection.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.entries().into_iter().map(|e| e.event).collect()
    }
}

#[async_trait]
impl AuditLog for MemoryAuditLog {
    async fn record(&self, entry: AuditEntry) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }
}

/// Appends rendered entries to the `cla-{stage}-events` table.
#[derive(Debug, Clone)]
pub struct DynamoAuditLog {
    client: Client,
    table: String,
}

impl DynamoAuditLog {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl AuditLog for DynamoAuditLog {
    async fn record(&self, entry: AuditEntry) {
        let mut request = self
            .client
            .put_item()
            .table_name(&self.table)
            .item("event_id", AttributeValue::S(uuid::Uuid::new_v4().to_string()))
            .item("event_type", AttributeValue::S(entry.event.kind().to_string()))
            .item("event_data", AttributeValue::S(entry.render()))
            .item("event_user_name", AttributeValue::S(entry.actor.clone()))
            .item(
                "event_time",
                AttributeValue::S(entry.recorded_at.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        if let Some(project) = &entry.project_sfid {
            request = request.item("event_project_sfid", AttributeValue::S(project.to_string()));
        }
        if let Some(group) = &entry.cla_group_id {
            request = request.item("event_cla_group_id", AttributeValue::S(group.to_string()));
        }
        if let Some(company) = &entry.company_id {
            request = request.item("event_company_id", AttributeValue::S(company.clone()));
        }

        if let Err(e) = request.send().await {
            warn!(
                event_type = entry.event.kind(),
                error = %DisplayErrorContext(&e),
                "Failed to persist audit event"
            );
        }
    }
}
