//! Routing of parsed webhook events to their effects.
//!
//! Items inside one delivery (for example the repositories of an
//! `installation_repositories` event) are handled independently: a bad or
//! failing item is recorded in the [`DispatchReport`] and the rest continue.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::audit::{AuditEntry, AuditEvent, AuditLog};
use crate::autoenable::{AutoEnableError, AutoEnabler};
use crate::directory::ManagerNotifier;
use crate::provider::CommitAuthorSource;
use crate::store::{OrganizationStore, RepositoryStore};
use crate::types::Provider;

use super::command::contains_recheck_command;
use super::events::{
    CommentAction, InstallationAction, InstallationEvent, InstallationRepositoriesEvent,
    IssueCommentEvent, RepositoriesAction, RepositoryAction, RepositoryEvent, RepositoryRef,
    WebhookEvent,
};

/// What happened to each item of a delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub event: String,
    pub action: String,
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

impl DispatchReport {
    fn new(event: &WebhookEvent) -> Self {
        DispatchReport {
            event: event.name().to_string(),
            action: event.action().to_string(),
            ..Default::default()
        }
    }

    fn applied(&mut self, message: impl Into<String>) {
        self.applied.push(message.into());
    }

    fn skipped(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(event = %self.event, action = %self.action, %message, "Webhook item skipped");
        self.skipped.push(message);
    }

    fn failed(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(event = %self.event, action = %self.action, %message, "Webhook item failed");
        self.failed.push(message);
    }
}

#[derive(Clone)]
pub struct WebhookDispatcher {
    organizations: Arc<dyn OrganizationStore>,
    repositories: Arc<dyn RepositoryStore>,
    auto_enabler: AutoEnabler,
    authors: Arc<dyn CommitAuthorSource>,
    notifier: Arc<dyn ManagerNotifier>,
    audit: Arc<dyn AuditLog>,
}

impl WebhookDispatcher {
    /// `organizations` must be the GitHub organization store.
    pub fn new(
        organizations: Arc<dyn OrganizationStore>,
        repositories: Arc<dyn RepositoryStore>,
        authors: Arc<dyn CommitAuthorSource>,
        notifier: Arc<dyn ManagerNotifier>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            auto_enabler: AutoEnabler::new(organizations.clone(), repositories.clone()),
            organizations,
            repositories,
            authors,
            notifier,
            audit,
        }
    }

    pub async fn dispatch(&self, event: WebhookEvent) -> DispatchReport {
        let mut report = DispatchReport::new(&event);
        match event {
            WebhookEvent::InstallationRepositories(e) => {
                self.on_installation_repositories(e, &mut report).await
            }
            WebhookEvent::Repository(e) => self.on_repository(e, &mut report).await,
            WebhookEvent::IssueComment(e) => self.on_issue_comment(e, &mut report).await,
            WebhookEvent::Installation(e) => self.on_installation(e, &mut report).await,
        }

        info!(
            event = %report.event,
            action = %report.action,
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Webhook dispatched"
        );
        report
    }

    async fn on_installation_repositories(
        &self,
        event: InstallationRepositoriesEvent,
        report: &mut DispatchReport,
    ) {
        match event.action {
            RepositoriesAction::Added => {
                for repository in &event.added {
                    self.repository_added(repository, event.sender.as_deref(), report)
                        .await;
                }
            }
            RepositoriesAction::Removed => {
                for repository in &event.removed {
                    self.repository_removed(repository, event.sender.as_deref(), report)
                        .await;
                }
            }
            RepositoriesAction::Other(action) => report.skipped(format!("action {action} ignored")),
        }
    }

    async fn on_repository(&self, event: RepositoryEvent, report: &mut DispatchReport) {
        match event.action {
            RepositoryAction::Created => {
                self.repository_added(&event.repository, event.sender.as_deref(), report)
                    .await
            }
            RepositoryAction::Deleted => {
                self.repository_removed(&event.repository, event.sender.as_deref(), report)
                    .await
            }
            RepositoryAction::Other(action) => report.skipped(format!("action {action} ignored")),
        }
    }

    async fn repository_added(
        &self,
        repository: &RepositoryRef,
        sender: Option<&str>,
        report: &mut DispatchReport,
    ) {
        let repository = match repository.validate() {
            Ok(r) => r,
            Err(field) => {
                report.failed(format!("{}: missing {field}", repository.label()));
                return;
            }
        };

        let outcome = match self.auto_enabler.enable(&repository).await {
            Ok(outcome) => outcome,
            Err(AutoEnableError::Off { reason, .. }) => {
                info!(repository = %repository.full_name, %reason, "Repository not auto-enabled");
                report.skipped(format!("{}: {reason}", repository.full_name));
                return;
            }
            Err(e) => {
                report.failed(format!("{}: {e}", repository.full_name));
                return;
            }
        };

        if !outcome.changed() {
            report.skipped(format!("{}: already enabled", repository.full_name));
            return;
        }

        let record = outcome.repository();
        if let Err(e) = self
            .notifier
            .repositories_added(&record.cla_group_id, std::slice::from_ref(&record.full_name))
            .await
        {
            warn!(
                repository = %record.full_name,
                cla_group_id = %record.cla_group_id,
                error = %e,
                "Notifying CLA managers failed"
            );
        }

        match sender {
            Some(sender) => {
                self.audit
                    .record(
                        AuditEntry::new(
                            sender,
                            AuditEvent::RepositoryAdded {
                                provider: Provider::Github,
                                repository_name: record.full_name.clone(),
                                external_id: record.external_id,
                            },
                        )
                        .project(&record.project_sfid)
                        .cla_group(&record.cla_group_id),
                    )
                    .await
            }
            None => warn!(
                repository = %record.full_name,
                "Delivery has no sender, repository addition not audited"
            ),
        }

        report.applied(format!("{}: enabled", record.full_name));
    }

    async fn repository_removed(
        &self,
        repository: &RepositoryRef,
        sender: Option<&str>,
        report: &mut DispatchReport,
    ) {
        let external_id = match repository.external_id() {
            Ok(id) => id,
            Err(field) => {
                report.failed(format!("{}: missing {field}", repository.label()));
                return;
            }
        };

        let record = match self
            .repositories
            .get_repository_by_external_id(Provider::Github, external_id, true)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                report.skipped(format!("{}: no enabled record", repository.label()));
                return;
            }
            Err(e) => {
                report.failed(format!("{}: {e}", repository.label()));
                return;
            }
        };

        if let Err(e) = self.repositories.disable_repository(&record.id).await {
            report.failed(format!("{}: {e}", record.full_name));
            return;
        }

        info!(
            repository = %record.full_name,
            external_id = %record.external_id,
            "Repository disabled"
        );

        match sender {
            Some(sender) => {
                self.audit
                    .record(
                        AuditEntry::new(
                            sender,
                            AuditEvent::RepositoryDisabled {
                                provider: Provider::Github,
                                repository_name: record.full_name.clone(),
                                external_id: record.external_id,
                            },
                        )
                        .project(&record.project_sfid)
                        .cla_group(&record.cla_group_id),
                    )
                    .await
            }
            None => warn!(
                repository = %record.full_name,
                "Delivery has no sender, repository removal not audited"
            ),
        }

        report.applied(format!("{}: disabled", record.full_name));
    }

    async fn on_issue_comment(&self, event: IssueCommentEvent, report: &mut DispatchReport) {
        if !matches!(event.action, CommentAction::Created | CommentAction::Edited) {
            report.skipped(format!("action {} ignored", event.action.as_str()));
            return;
        }
        if !contains_recheck_command(&event.body) {
            report.skipped("no recheck command");
            return;
        }
        let (Some(installation_id), Some(repository_id), Some(pull)) =
            (event.installation_id, event.repository_id, event.pull_number)
        else {
            report.skipped("comment lacks installation, repository or pull request");
            return;
        };

        let repository = match self
            .repositories
            .get_repository_by_external_id(Provider::Github, repository_id, true)
            .await
        {
            Ok(Some(r)) => r,
            Ok(None) => {
                report.failed(format!("repository {repository_id} is not enabled"));
                return;
            }
            Err(e) => {
                report.failed(format!("repository {repository_id}: {e}"));
                return;
            }
        };

        let organization = match self
            .organizations
            .get_organization_by_name(&repository.organization_name)
            .await
        {
            Ok(Some(org)) => org,
            Ok(None) => {
                report.failed(format!(
                    "organization {} is not registered",
                    repository.organization_name
                ));
                return;
            }
            Err(e) => {
                report.failed(format!("organization {}: {e}", repository.organization_name));
                return;
            }
        };

        if organization.installation_id != Some(installation_id) {
            report.failed(format!(
                "installation {installation_id} does not match organization {}",
                organization.name
            ));
            return;
        }

        let authors = match self
            .authors
            .commit_authors(installation_id, repository_id, pull)
            .await
        {
            Ok(authors) if !authors.is_empty() => authors,
            Ok(_) => {
                report.failed(format!("{} {pull}: no commit authors", repository.full_name));
                return;
            }
            Err(e) => {
                report.failed(format!("{} {pull}: {e}", repository.full_name));
                return;
            }
        };

        for author in &authors {
            info!(
                repository = %repository.full_name,
                pull = %pull,
                sha = %author.sha,
                author = %author.display_name(),
                "Commit author"
            );
        }
        report.applied(format!(
            "{} {pull}: {} commit authors resolved",
            repository.full_name,
            authors.len()
        ));
    }

    async fn on_installation(&self, event: InstallationEvent, report: &mut DispatchReport) {
        let installation_id = match event.action {
            InstallationAction::Created => match event.installation_id {
                Some(id) => Some(id),
                None => {
                    report.skipped("installation has no id");
                    return;
                }
            },
            InstallationAction::Deleted => None,
            InstallationAction::Other(action) => {
                report.skipped(format!("action {action} ignored"));
                return;
            }
        };
        let Some(account) = event.account_login else {
            report.skipped("installation has no account");
            return;
        };

        let organization = match self.organizations.get_organization_by_name(&account).await {
            Ok(Some(org)) => org,
            Ok(None) => {
                info!(account = %account, "Installation for an unregistered account");
                report.skipped(format!("{account}: not registered"));
                return;
            }
            Err(e) => {
                report.failed(format!("{account}: {e}"));
                return;
            }
        };

        if let Err(e) = self
            .organizations
            .set_installation_id(&organization.id, installation_id)
            .await
        {
            report.failed(format!("{}: {e}", organization.name));
            return;
        }

        info!(
            organization = %organization.name,
            installation_id = ?installation_id,
            "Installation updated"
        );

        self.audit
            .record(
                AuditEntry::new(
                    event.sender.as_deref().unwrap_or("github"),
                    AuditEvent::InstallationChanged {
                        organization_name: organization.name.clone(),
                        installation_id,
                    },
                )
                .project(&organization.project_sfid),
            )
            .await;

        report.applied(format!("{}: installation updated", organization.name));
    }
}
