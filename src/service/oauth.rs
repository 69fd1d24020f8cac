//! Completion of the GitLab OAuth authorization flow.
//!
//! GitLab redirects back with `code` and `state`. The code has the form
//! `<organization id>:<auth state>`; the auth state must equal the one minted
//! when the organization was registered. On success the exchanged
//! credentials are encrypted and stored on the organization record.

use std::sync::Arc;

use tracing::{info, warn};

use crate::audit::{AuditEntry, AuditEvent, AuditLog};
use crate::error::ServiceError;
use crate::provider::{TokenCipher, TokenExchange};
use crate::store::OrganizationStore;
use crate::types::{Organization, OrganizationId};

/// Splits an authorization code into its organization id and auth state.
pub fn split_code(code: &str) -> Result<(OrganizationId, &str), ServiceError> {
    let mut parts = code.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(org_id), Some(state), None) if !org_id.is_empty() && !state.is_empty() => {
            Ok((OrganizationId::from(org_id), state))
        }
        _ => Err(ServiceError::validation(
            "invalid code parameter, expected <organization id>:<state>",
        )),
    }
}

#[derive(Clone)]
pub struct GitLabAuthorization {
    organizations: Arc<dyn OrganizationStore>,
    exchange: Arc<dyn TokenExchange>,
    cipher: Arc<TokenCipher>,
    audit: Arc<dyn AuditLog>,
}

impl GitLabAuthorization {
    pub fn new(
        organizations: Arc<dyn OrganizationStore>,
        exchange: Arc<dyn TokenExchange>,
        cipher: Arc<TokenCipher>,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            organizations,
            exchange,
            cipher,
            audit,
        }
    }

    /// The organization `org_id`, provided its auth state matches `state`.
    pub async fn organization_by_state(
        &self,
        org_id: &OrganizationId,
        state: &str,
    ) -> Result<Organization, ServiceError> {
        let organization = self
            .organizations
            .get_organization(org_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("gitlab organization {org_id}")))?;

        if organization.auth_state.as_deref() != Some(state) {
            warn!(organization_id = %org_id, "OAuth state mismatch");
            return Err(ServiceError::validation("auth state doesn't match"));
        }
        Ok(organization)
    }

    /// Handles one OAuth callback. Returns the authorized organization.
    pub async fn complete(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<Organization, ServiceError> {
        let code = code
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::validation("missing code parameter"))?;
        state
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ServiceError::validation("missing state parameter"))?;

        let (org_id, code_state) = split_code(code)?;
        let organization = self.organization_by_state(&org_id, code_state).await?;

        let credentials = self.exchange.exchange_code(code).await.map_err(|e| {
            ServiceError::Internal(format!("fetching gitlab oauth credentials failed: {e}"))
        })?;
        let serialized = serde_json::to_string(&credentials)
            .map_err(|e| ServiceError::Internal(format!("serializing credentials: {e}")))?;
        let sealed = self.cipher.encrypt(&serialized)?;

        self.organizations
            .update_auth_info(&organization.id, &sealed)
            .await?;

        info!(
            organization = %organization.name,
            organization_id = %organization.id,
            "GitLab organization authorized"
        );

        self.audit
            .record(
                AuditEntry::new(
                    "gitlab",
                    AuditEvent::OrganizationAuthorized {
                        organization_name: organization.name.clone(),
                    },
                )
                .project(&organization.project_sfid),
            )
            .await;

        Ok(organization)
    }
}
