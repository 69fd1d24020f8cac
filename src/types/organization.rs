//! Registered provider organizations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{ClaGroupId, InstallationId, OrganizationId, ProjectSfid};

/// Record version written with every organization.
pub const RECORD_VERSION: &str = "v1";

/// The source-control provider an organization lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Github,
    Gitlab,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Github => "github",
            Provider::Gitlab => "gitlab",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-editable settings of an organization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationSettings {
    pub auto_enabled: bool,
    pub auto_enabled_cla_group_id: Option<ClaGroupId>,
    pub branch_protection_enabled: bool,
}

impl OrganizationSettings {
    /// The CLA group new repositories are attached to, if auto-enable is on
    /// and a target is configured.
    pub fn auto_enable_target(&self) -> Option<&ClaGroupId> {
        if self.auto_enabled {
            self.auto_enabled_cla_group_id
                .as_ref()
                .filter(|id| !id.as_str().trim().is_empty())
        } else {
            None
        }
    }
}

/// A provider organization (GitHub organization or GitLab group) registered
/// under a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: OrganizationId,
    pub provider: Provider,
    pub name: String,
    pub name_lower: String,
    pub project_sfid: ProjectSfid,
    pub parent_project_sfid: ProjectSfid,
    /// GitHub App installation. Always `None` for GitLab groups.
    pub installation_id: Option<InstallationId>,
    /// Encrypted OAuth credentials (GitLab only).
    #[serde(skip_serializing, default)]
    pub auth_info: Option<String>,
    /// OAuth state the callback must echo back (GitLab only).
    pub auth_state: Option<String>,
    #[serde(flatten)]
    pub settings: OrganizationSettings,
    pub enabled: bool,
    pub date_created: DateTime<Utc>,
    pub date_modified: DateTime<Utc>,
    pub version: String,
}

impl Organization {
    /// Builds a fresh, enabled record with a generated id.
    pub fn new(
        provider: Provider,
        name: impl Into<String>,
        project_sfid: ProjectSfid,
        parent_project_sfid: ProjectSfid,
        settings: OrganizationSettings,
        now: DateTime<Utc>,
    ) -> Self {
        let name = name.into();
        let auth_state = match provider {
            Provider::Github => None,
            Provider::Gitlab => Some(uuid::Uuid::new_v4().simple().to_string()),
        };
        Organization {
            id: OrganizationId::new(uuid::Uuid::new_v4().to_string()),
            provider,
            name_lower: name.to_lowercase(),
            name,
            project_sfid,
            parent_project_sfid,
            installation_id: None,
            auth_info: None,
            auth_state,
            settings,
            enabled: true,
            date_created: now,
            date_modified: now,
            version: RECORD_VERSION.to_string(),
        }
    }

    /// Whether the provider has granted this organization API access.
    ///
    /// GitHub organizations need an App installation; GitLab groups need
    /// stored OAuth credentials.
    pub fn has_installation(&self) -> bool {
        match self.provider {
            Provider::Github => self.installation_id.is_some(),
            Provider::Gitlab => self.auth_info.is_some(),
        }
    }

    /// Browser link to the GitHub App installation settings.
    pub fn installation_url(&self) -> Option<String> {
        match (self.provider, self.installation_id) {
            (Provider::Github, Some(id)) => Some(format!(
                "https://github.com/organizations/{}/settings/installations/{}",
                self.name, id
            )),
            _ => None,
        }
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name_lower == name.to_lowercase()
    }
}
