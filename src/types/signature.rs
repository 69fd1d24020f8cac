//! Signatures and their GitHub organization approval lists.
//!
//! A corporate signature can approve whole GitHub organizations: members of
//! an approved organization are covered by the company's agreement. Names are
//! compared case-insensitively and stored as given.

use serde::{Deserialize, Serialize};

use super::ids::{ClaGroupId, SignatureId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub id: SignatureId,
    pub cla_group_id: ClaGroupId,
    /// The signing company, for corporate signatures.
    pub company_id: Option<String>,
    pub github_org_approval_list: Vec<String>,
}

/// One entry of an approval list as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedOrganization {
    pub id: String,
    pub selected: bool,
}

impl Signature {
    pub fn approves_github_organization(&self, name: &str) -> bool {
        self.github_org_approval_list
            .iter()
            .any(|approved| approved.eq_ignore_ascii_case(name))
    }

    /// Returns whether the list changed.
    pub fn approve_github_organization(&mut self, name: &str) -> bool {
        if self.approves_github_organization(name) {
            return false;
        }
        self.github_org_approval_list.push(name.to_string());
        true
    }

    /// Returns whether the list changed.
    pub fn revoke_github_organization(&mut self, name: &str) -> bool {
        let before = self.github_org_approval_list.len();
        self.github_org_approval_list
            .retain(|approved| !approved.eq_ignore_ascii_case(name));
        self.github_org_approval_list.len() != before
    }

    pub fn approved_github_organizations(&self) -> Vec<ApprovedOrganization> {
        self.github_org_approval_list
            .iter()
            .map(|name| ApprovedOrganization {
                id: name.clone(),
                selected: true,
            })
            .collect()
    }
}
