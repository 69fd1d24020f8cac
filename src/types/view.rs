//! The connection-status view returned to API callers.
//!
//! Nothing here is persisted; every value is derived on read by
//! [`crate::reconcile`].

use serde::{Deserialize, Serialize};

use super::ids::{ClaGroupId, ExternalRepoId, ProjectSfid, RepositoryId};
use super::organization::Provider;

/// How an organization's or repository's provider access compares to its
/// local registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    PartialConnection,
    ConnectionFailure,
    NoConnection,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::PartialConnection => "partial_connection",
            ConnectionStatus::ConnectionFailure => "connection_failure",
            ConnectionStatus::NoConnection => "no_connection",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectOrganizationView {
    pub project_sfid: ProjectSfid,
    pub organizations: Vec<OrganizationView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationView {
    pub organization_name: String,
    pub provider: Provider,
    pub connection_status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_status_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installation_url: Option<String>,
    pub auto_enabled: bool,
    pub auto_enabled_cla_group_id: Option<ClaGroupId>,
    pub auto_enabled_cla_group_name: Option<String>,
    pub branch_protection_enabled: bool,
    pub repositories: Vec<RepositoryView>,
}

/// One repository row. `repository_id` is absent for repositories the
/// provider exposes but that were never registered locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryView {
    pub repository_id: Option<RepositoryId>,
    pub external_id: ExternalRepoId,
    pub name: String,
    pub url: String,
    pub cla_group_id: Option<ClaGroupId>,
    pub enabled: bool,
    pub connection_status: ConnectionStatus,
}
