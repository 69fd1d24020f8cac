//! GitHub organization approval lists on corporate signatures.
//!
//! Updates are read-modify-write on the signature's list. Adding a name that
//! is already approved, or removing one that is not, changes nothing and
//! records no audit event.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::audit::{AuditEntry, AuditEvent, AuditLog};
use crate::error::ServiceError;
use crate::store::{SignatureStore, StoreError};
use crate::types::{ApprovedOrganization, Signature, SignatureId};

/// Body of an approval list change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApprovalListRequest {
    #[serde(default, alias = "organizationId")]
    pub organization_id: Option<String>,
}

impl ApprovalListRequest {
    fn organization(self) -> Result<String, ServiceError> {
        self.organization_id
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ServiceError::validation("organization_id is required"))
    }
}

#[derive(Clone)]
pub struct ApprovalListService {
    signatures: Arc<dyn SignatureStore>,
    audit: Arc<dyn AuditLog>,
}

impl ApprovalListService {
    pub fn new(signatures: Arc<dyn SignatureStore>, audit: Arc<dyn AuditLog>) -> Self {
        Self { signatures, audit }
    }

    pub async fn github_organizations(
        &self,
        id: &SignatureId,
    ) -> Result<Vec<ApprovedOrganization>, ServiceError> {
        Ok(self.signature(id).await?.approved_github_organizations())
    }

    pub async fn add_github_organization(
        &self,
        actor: &str,
        id: &SignatureId,
        request: ApprovalListRequest,
    ) -> Result<Vec<ApprovedOrganization>, ServiceError> {
        let name = request.organization()?;
        let mut signature = self.signature(id).await?;
        if signature.approve_github_organization(&name) {
            self.store(&signature).await?;
            info!(signature_id = %id, organization = %name, "GitHub organization approved");
            self.record(
                actor,
                &signature,
                AuditEvent::ApprovalListGithubOrganizationAdded {
                    organization_name: name,
                },
            )
            .await;
        }
        Ok(signature.approved_github_organizations())
    }

    pub async fn delete_github_organization(
        &self,
        actor: &str,
        id: &SignatureId,
        request: ApprovalListRequest,
    ) -> Result<Vec<ApprovedOrganization>, ServiceError> {
        let name = request.organization()?;
        let mut signature = self.signature(id).await?;
        if signature.revoke_github_organization(&name) {
            self.store(&signature).await?;
            info!(signature_id = %id, organization = %name, "GitHub organization approval revoked");
            self.record(
                actor,
                &signature,
                AuditEvent::ApprovalListGithubOrganizationDeleted {
                    organization_name: name,
                },
            )
            .await;
        }
        Ok(signature.approved_github_organizations())
    }

    async fn signature(&self, id: &SignatureId) -> Result<Signature, ServiceError> {
        self.signatures
            .get_signature(id)
            .await?
            .ok_or_else(|| StoreError::signature_not_found(id).into())
    }

    async fn store(&self, signature: &Signature) -> Result<(), ServiceError> {
        self.signatures
            .set_github_org_approval_list(&signature.id, &signature.github_org_approval_list)
            .await?;
        Ok(())
    }

    async fn record(&self, actor: &str, signature: &Signature, event: AuditEvent) {
        let mut entry = AuditEntry::new(actor, event).cla_group(&signature.cla_group_id);
        if let Some(company) = &signature.company_id {
            entry = entry.company(company);
        }
        self.audit.record(entry).await;
    }
}
