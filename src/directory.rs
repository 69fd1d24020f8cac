//! External collaborators: the project service, the CLA-group subsystem and
//! CLA-manager notifications.
//!
//! This crate never owns those records; it only asks the questions below.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::Client;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::types::AttributeValue;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{ClaGroupId, ProjectSfid};

/// Foundations whose child projects are treated as roots.
const ROOT_FOUNDATIONS: [&str; 2] = ["The Linux Foundation", "LF Projects, LLC"];

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Resolves project hierarchy.
#[async_trait]
pub trait ProjectDirectory: Send + Sync {
    /// The SFID organizations of this project are filed under: the project
    /// itself when it is a root, otherwise its parent.
    async fn parent_project(&self, project_sfid: &ProjectSfid)
    -> Result<ProjectSfid, DirectoryError>;
}

/// Looks up CLA group display names.
#[async_trait]
pub trait ClaGroupDirectory: Send + Sync {
    async fn cla_group_name(&self, id: &ClaGroupId) -> Result<Option<String>, DirectoryError>;
}

/// Tells CLA managers that repositories were attached to their CLA group.
#[async_trait]
pub trait ManagerNotifier: Send + Sync {
    async fn repositories_added(
        &self,
        cla_group_id: &ClaGroupId,
        repositories: &[String],
    ) -> Result<(), DirectoryError>;
}

// ─── Project service ───

/// Project service client.
#[derive(Debug, Clone)]
pub struct HttpProjectDirectory {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawProject {
    #[serde(default, alias = "Parent", alias = "parent_id")]
    parent: Option<String>,
    #[serde(default, alias = "Foundation")]
    foundation: Option<RawFoundation>,
}

#[derive(Debug, Deserialize)]
struct RawFoundation {
    #[serde(default, alias = "Name")]
    name: String,
}

impl HttpProjectDirectory {
    pub fn new(http: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

fn resolve_parent(project_sfid: &ProjectSfid, project: RawProject) -> ProjectSfid {
    let is_root_foundation = project
        .foundation
        .as_ref()
        .is_some_and(|f| ROOT_FOUNDATIONS.contains(&f.name.as_str()));
    match project.parent.filter(|p| !p.is_empty()) {
        Some(parent) if !is_root_foundation => ProjectSfid::new(parent),
        _ => project_sfid.clone(),
    }
}

#[async_trait]
impl ProjectDirectory for HttpProjectDirectory {
    async fn parent_project(
        &self,
        project_sfid: &ProjectSfid,
    ) -> Result<ProjectSfid, DirectoryError> {
        let url = format!(
            "{}/projects/{}",
            self.base_url,
            urlencoding::encode(project_sfid.as_str())
        );
        let response = self
            .http
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;

        match response.status() {
            s if s == reqwest::StatusCode::NOT_FOUND => {
                Err(DirectoryError::NotFound(format!("project {project_sfid}")))
            }
            s if !s.is_success() => Err(DirectoryError::Unavailable(format!(
                "project service returned {s}"
            ))),
            _ => {
                let project: RawProject = response
                    .json()
                    .await
                    .map_err(|e| DirectoryError::Unavailable(e.to_string()))?;
                let parent = resolve_parent(project_sfid, project);
                debug!(project_sfid = %project_sfid, parent = %parent, "Resolved parent project");
                Ok(parent)
            }
        }
    }
}

/// Treats every project as a root. Used when no project service is
/// configured.
#[derive(Debug, Default, Clone)]
pub struct StandaloneProjectDirectory;

#[async_trait]
impl ProjectDirectory for StandaloneProjectDirectory {
    async fn parent_project(
        &self,
        project_sfid: &ProjectSfid,
    ) -> Result<ProjectSfid, DirectoryError> {
        Ok(project_sfid.clone())
    }
}

// ─── CLA groups ───

/// Reads CLA group names from the `cla-{stage}-projects` table.
#[derive(Debug, Clone)]
pub struct DynamoClaGroupDirectory {
    client: Client,
    table: String,
}

impl DynamoClaGroupDirectory {
    pub fn new(client: Client, table: impl Into<String>) -> Self {
        Self {
            client,
            table: table.into(),
        }
    }
}

#[async_trait]
impl ClaGroupDirectory for DynamoClaGroupDirectory {
    async fn cla_group_name(&self, id: &ClaGroupId) -> Result<Option<String>, DirectoryError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table)
            .key("project_id", AttributeValue::S(id.to_string()))
            .projection_expression("project_name")
            .send()
            .await
            .map_err(|e| DirectoryError::Unavailable(DisplayErrorContext(&e).to_string()))?;

        Ok(output
            .item()
            .and_then(|item| item.get("project_name"))
            .and_then(|v| v.as_s().ok())
            .cloned())
    }
}

/// Fixed id-to-name table.
#[derive(Debug, Default, Clone)]
pub struct StaticClaGroupDirectory {
    names: HashMap<ClaGroupId, String>,
}

impl StaticClaGroupDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, id: impl Into<ClaGroupId>, name: impl Into<String>) -> Self {
        self.names.insert(id.into(), name.into());
        self
    }
}

#[async_trait]
impl ClaGroupDirectory for StaticClaGroupDirectory {
    async fn cla_group_name(&self, id: &ClaGroupId) -> Result<Option<String>, DirectoryError> {
        Ok(self.names.get(id).cloned())
    }
}

// ─── Notifications ───

/// Logs notifications instead of sending mail.
#[derive(Debug, Default, Clone)]
pub struct LoggingNotifier;

#[async_trait]
impl ManagerNotifier for LoggingNotifier {
    async fn repositories_added(
        &self,
        cla_group_id: &ClaGroupId,
        repositories: &[String],
    ) -> Result<(), DirectoryError> {
        info!(
            cla_group_id = %cla_group_id,
            repositories = ?repositories,
            "CLA managers notified of new repositories"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(parent: Option<&str>, foundation: Option<&str>) -> RawProject {
        RawProject {
            parent: parent.map(String::from),
            foundation: foundation.map(|n| RawFoundation { name: n.into() }),
        }
    }

    #[test]
    fn project_without_parent_is_its_own_root() {
        let sfid = ProjectSfid::from("p1");
        assert_eq!(resolve_parent(&sfid, raw(None, None)), sfid);
        assert_eq!(resolve_parent(&sfid, raw(Some(""), None)), sfid);
    }

    #[test]
    fn child_project_resolves_to_parent() {
        let sfid = ProjectSfid::from("child");
        assert_eq!(
            resolve_parent(&sfid, raw(Some("parent"), Some("CNCF"))),
            ProjectSfid::from("parent")
        );
    }

    #[test]
    fn direct_children_of_root_foundations_stay_roots() {
        let sfid = ProjectSfid::from("child");
        for foundation in ROOT_FOUNDATIONS {
            assert_eq!(
                resolve_parent(&sfid, raw(Some("lf"), Some(foundation))),
                sfid
            );
        }
    }

    #[test]
    fn project_payload_accepts_service_casing() {
        let parsed: RawProject = serde_json::from_str(
            r#"{"ID":"child","Parent":"parent","Foundation":{"Name":"LF Projects, LLC"}}"#,
        )
        .unwrap();
        assert_eq!(resolve_parent(&ProjectSfid::from("child"), parsed), ProjectSfid::from("child"));
    }

    #[tokio::test]
    async fn static_directory_lookup() {
        let dir = StaticClaGroupDirectory::new().with_group("g1", "Group One");
        assert_eq!(
            dir.cla_group_name(&ClaGroupId::from("g1")).await.unwrap().as_deref(),
            Some("Group One")
        );
        assert_eq!(dir.cla_group_name(&ClaGroupId::from("g2")).await.unwrap(), None);
    }
}
