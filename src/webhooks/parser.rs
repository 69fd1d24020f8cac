//! GitHub webhook payload parser.
//!
//! The event type comes from the `X-GitHub-Event` header. Unknown event types
//! parse to `Ok(None)` and are acknowledged without action; malformed JSON is
//! an error.

use serde::Deserialize;
use thiserror::Error;

use crate::types::{ExternalRepoId, InstallationId, PullNumber};

use super::events::{
    CommentAction, InstallationAction, InstallationEvent, InstallationRepositoriesEvent,
    IssueCommentEvent, RepositoriesAction, RepositoryAction, RepositoryEvent, RepositoryRef,
    WebhookEvent,
};

#[derive(Debug, Error)]
pub enum ParseError {
    /// JSON deserialization failed (includes missing required fields).
    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("invalid field value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Parses a delivery body according to its event type.
///
/// ```
/// use cla_connect::webhooks::{WebhookEvent, parse_webhook};
///
/// let payload = br#"{
///     "action": "added",
///     "installation": { "id": 7 },
///     "repositories_added": [{ "id": 1, "name": "api", "full_name": "acme/api" }],
///     "repositories_removed": [],
///     "sender": { "login": "octocat" }
/// }"#;
///
/// let event = parse_webhook("installation_repositories", payload).unwrap();
/// assert!(matches!(event, Some(WebhookEvent::InstallationRepositories(_))));
/// assert!(parse_webhook("star", b"{}").unwrap().is_none());
/// ```
pub fn parse_webhook(event_type: &str, payload: &[u8]) -> Result<Option<WebhookEvent>, ParseError> {
    match event_type {
        "installation_repositories" => parse_installation_repositories(payload)
            .map(|e| Some(WebhookEvent::InstallationRepositories(e))),
        "repository" => parse_repository(payload).map(|e| Some(WebhookEvent::Repository(e))),
        "issue_comment" => {
            parse_issue_comment(payload).map(|e| Some(WebhookEvent::IssueComment(e)))
        }
        "installation" => parse_installation(payload).map(|e| Some(WebhookEvent::Installation(e))),
        _ => Ok(None),
    }
}

// ─── Raw payload structures ───

#[derive(Debug, Deserialize)]
struct RawInstallation {
    id: Option<u64>,
    account: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawUser {
    login: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRepository {
    id: Option<u64>,
    name: Option<String>,
    full_name: Option<String>,
    html_url: Option<String>,
}

impl From<RawRepository> for RepositoryRef {
    fn from(raw: RawRepository) -> Self {
        RepositoryRef {
            id: raw.id,
            name: raw.name,
            full_name: raw.full_name,
            html_url: raw.html_url,
        }
    }
}

fn installation_id(installation: &Option<RawInstallation>) -> Option<InstallationId> {
    installation
        .as_ref()
        .and_then(|i| i.id)
        .filter(|id| *id != 0)
        .map(InstallationId)
}

fn login(user: Option<RawUser>) -> Option<String> {
    user.and_then(|u| u.login).filter(|l| !l.is_empty())
}

fn non_empty_action(action: String) -> Result<String, ParseError> {
    if action.trim().is_empty() {
        return Err(ParseError::InvalidField {
            field: "action",
            value: action,
        });
    }
    Ok(action)
}

// ─── installation_repositories ───

#[derive(Debug, Deserialize)]
struct RawInstallationRepositoriesPayload {
    action: String,
    installation: Option<RawInstallation>,
    #[serde(default)]
    repositories_added: Vec<RawRepository>,
    #[serde(default)]
    repositories_removed: Vec<RawRepository>,
    sender: Option<RawUser>,
}

fn parse_installation_repositories(
    payload: &[u8],
) -> Result<InstallationRepositoriesEvent, ParseError> {
    let raw: RawInstallationRepositoriesPayload = serde_json::from_slice(payload)?;
    Ok(InstallationRepositoriesEvent {
        action: RepositoriesAction::parse(&non_empty_action(raw.action)?),
        installation_id: installation_id(&raw.installation),
        added: raw.repositories_added.into_iter().map(Into::into).collect(),
        removed: raw
            .repositories_removed
            .into_iter()
            .map(Into::into)
            .collect(),
        sender: login(raw.sender),
    })
}

// ─── repository ───

#[derive(Debug, Deserialize)]
struct RawRepositoryPayload {
    action: String,
    #[serde(default)]
    repository: RawRepository,
    sender: Option<RawUser>,
}

fn parse_repository(payload: &[u8]) -> Result<RepositoryEvent, ParseError> {
    let raw: RawRepositoryPayload = serde_json::from_slice(payload)?;
    Ok(RepositoryEvent {
        action: RepositoryAction::parse(&non_empty_action(raw.action)?),
        repository: raw.repository.into(),
        sender: login(raw.sender),
    })
}

// ─── issue_comment ───

#[derive(Debug, Deserialize)]
struct RawIssueCommentPayload {
    action: String,
    installation: Option<RawInstallation>,
    issue: Option<RawIssue>,
    comment: Option<RawComment>,
    repository: Option<RawRepository>,
    sender: Option<RawUser>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: Option<u64>,
    // Present only when the issue is a pull request.
    pull_request: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    body: Option<String>,
}

fn parse_issue_comment(payload: &[u8]) -> Result<IssueCommentEvent, ParseError> {
    let raw: RawIssueCommentPayload = serde_json::from_slice(payload)?;

    let pull_number = raw
        .issue
        .filter(|issue| issue.pull_request.is_some())
        .and_then(|issue| issue.number)
        .filter(|n| *n != 0)
        .map(PullNumber);

    Ok(IssueCommentEvent {
        action: CommentAction::parse(&non_empty_action(raw.action)?),
        installation_id: installation_id(&raw.installation),
        repository_id: raw
            .repository
            .and_then(|r| r.id)
            .filter(|id| *id != 0)
            .map(ExternalRepoId),
        pull_number,
        body: raw.comment.and_then(|c| c.body).unwrap_or_default(),
        sender: login(raw.sender),
    })
}

// ─── installation ───

#[derive(Debug, Deserialize)]
struct RawInstallationPayload {
    action: String,
    installation: Option<RawInstallation>,
    sender: Option<RawUser>,
}

fn parse_installation(payload: &[u8]) -> Result<InstallationEvent, ParseError> {
    let raw: RawInstallationPayload = serde_json::from_slice(payload)?;
    let installation_id = installation_id(&raw.installation);
    Ok(InstallationEvent {
        action: InstallationAction::parse(&non_empty_action(raw.action)?),
        installation_id,
        account_login: login(raw.installation.and_then(|i| i.account)),
        sender: login(raw.sender),
    })
}
