//! Typed GitHub webhook events the service reacts to.
//!
//! - `installation_repositories`: repositories added to or removed from an
//!   app installation
//! - `repository`: a repository created or deleted in an installed account
//! - `issue_comment`: `/easycla` re-check requests on pull requests
//! - `installation`: the app installed on or removed from an account
//!
//! Repository references keep their fields optional; the dispatcher validates
//! each one separately so a single bad entry does not reject the delivery.

use serde::Serialize;

use crate::types::{ExternalRepoId, InstallationId, ProviderRepository, PullNumber};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    InstallationRepositories(InstallationRepositoriesEvent),
    Repository(RepositoryEvent),
    IssueComment(IssueCommentEvent),
    Installation(InstallationEvent),
}

impl WebhookEvent {
    pub fn name(&self) -> &'static str {
        match self {
            WebhookEvent::InstallationRepositories(_) => "installation_repositories",
            WebhookEvent::Repository(_) => "repository",
            WebhookEvent::IssueComment(_) => "issue_comment",
            WebhookEvent::Installation(_) => "installation",
        }
    }

    pub fn action(&self) -> &str {
        match self {
            WebhookEvent::InstallationRepositories(e) => e.action.as_str(),
            WebhookEvent::Repository(e) => e.action.as_str(),
            WebhookEvent::IssueComment(e) => e.action.as_str(),
            WebhookEvent::Installation(e) => e.action.as_str(),
        }
    }
}

/// Declares an action enum with the known variants and a catch-all.
macro_rules! action_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant,)+
            Other(String),
        }

        impl $name {
            pub fn parse(action: &str) -> Self {
                match action {
                    $($text => $name::$variant,)+
                    other => $name::Other(other.to_string()),
                }
            }

            pub fn as_str(&self) -> &str {
                match self {
                    $($name::$variant => $text,)+
                    $name::Other(other) => other,
                }
            }
        }
    };
}

action_enum!(RepositoriesAction { Added => "added", Removed => "removed" });
action_enum!(RepositoryAction { Created => "created", Deleted => "deleted" });
action_enum!(CommentAction { Created => "created", Edited => "edited", Deleted => "deleted" });
action_enum!(InstallationAction { Created => "created", Deleted => "deleted" });

/// A repository as it appears inside a webhook payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryRef {
    pub id: Option<u64>,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub html_url: Option<String>,
}

impl RepositoryRef {
    /// Best available label for logs and audit text.
    pub fn label(&self) -> String {
        self.full_name
            .clone()
            .or_else(|| self.name.clone())
            .or_else(|| self.id.map(|id| id.to_string()))
            .unwrap_or_else(|| "<unnamed>".to_string())
    }

    pub fn external_id(&self) -> Result<ExternalRepoId, &'static str> {
        self.id
            .filter(|id| *id != 0)
            .map(ExternalRepoId)
            .ok_or("id")
    }

    /// A repository with id, name and full name present and non-empty.
    /// Returns the first missing field otherwise.
    pub fn validate(&self) -> Result<ProviderRepository, &'static str> {
        let external_id = self.external_id()?;
        let name = non_empty(&self.name).ok_or("name")?;
        let full_name = non_empty(&self.full_name).ok_or("full_name")?;
        let url = self
            .html_url
            .clone()
            .unwrap_or_else(|| format!("https://github.com/{full_name}"));
        Ok(ProviderRepository {
            external_id,
            name: name.to_string(),
            full_name: full_name.to_string(),
            url,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationRepositoriesEvent {
    pub action: RepositoriesAction,
    pub installation_id: Option<InstallationId>,
    pub added: Vec<RepositoryRef>,
    pub removed: Vec<RepositoryRef>,
    pub sender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEvent {
    pub action: RepositoryAction,
    pub repository: RepositoryRef,
    pub sender: Option<String>,
}

/// A comment on an issue or pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueCommentEvent {
    pub action: CommentAction,
    pub installation_id: Option<InstallationId>,
    pub repository_id: Option<ExternalRepoId>,
    /// Set only when the issue is a pull request.
    pub pull_number: Option<PullNumber>,
    pub body: String,
    pub sender: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationEvent {
    pub action: InstallationAction,
    pub installation_id: Option<InstallationId>,
    pub account_login: Option<String>,
    pub sender: Option<String>,
}
