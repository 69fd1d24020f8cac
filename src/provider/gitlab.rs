//! GitLab adapter over the v4 REST API.
//!
//! Calls are authorized with the group's stored OAuth access token, which is
//! decrypted per request. Pagination follows the `x-next-page` header.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{OAuthCredentials, PAGE_SIZE, ProviderClient, ProviderError, TokenCipher, with_deadline};
use crate::types::{ExternalRepoId, Organization, ProviderRepository};

#[derive(Debug, Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    api_base: String,
    cipher: Arc<TokenCipher>,
    timeout: Duration,
}

impl GitLabClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        cipher: Arc<TokenCipher>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            api_base: format!("{}/api/v4", base_url.trim_end_matches('/')),
            cipher,
            timeout,
        }
    }

    fn access_token(&self, organization: &Organization) -> Result<String, ProviderError> {
        let sealed = organization
            .auth_info
            .as_deref()
            .ok_or_else(|| ProviderError::NotInstalled(organization.name.clone()))?;
        let json = self
            .cipher
            .decrypt(sealed)
            .map_err(|e| ProviderError::Other(format!("stored credentials unreadable: {e}")))?;
        let credentials: OAuthCredentials = serde_json::from_str(&json)
            .map_err(|e| ProviderError::Other(format!("stored credentials malformed: {e}")))?;
        Ok(credentials.access_token)
    }

    fn projects_url(&self, group: &str) -> String {
        format!(
            "{}/groups/{}/projects",
            self.api_base,
            urlencoding::encode(group)
        )
    }

    async fn list_group_projects(
        &self,
        group: &str,
        token: &str,
    ) -> Result<Vec<ProviderRepository>, ProviderError> {
        let url = self.projects_url(group);
        let mut page = String::from("1");
        let mut all = Vec::new();

        loop {
            let response = self
                .http
                .get(&url)
                .bearer_auth(token)
                .query(&[
                    ("per_page", PAGE_SIZE.to_string()),
                    ("page", page.clone()),
                    ("include_subgroups", "true".to_string()),
                ])
                .send()
                .await
                .map_err(ProviderError::from_reqwest)?;

            let status = response.status();
            if !status.is_success() {
                return Err(ProviderError::from_status(
                    status.as_u16(),
                    format!("listing projects of group {group}"),
                ));
            }

            let next_page = response
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let projects: Vec<RawProject> = response
                .json()
                .await
                .map_err(|e| ProviderError::Other(format!("undecodable project page: {e}")))?;
            all.extend(projects.into_iter().map(ProviderRepository::from));

            match next_page {
                Some(next) => page = next,
                None => break,
            }
        }

        debug!(group = %group, count = all.len(), "Listed GitLab group projects");
        Ok(all)
    }
}

#[async_trait]
impl ProviderClient for GitLabClient {
    async fn list_organization_repositories(
        &self,
        organization: &Organization,
    ) -> Result<Vec<ProviderRepository>, ProviderError> {
        let token = self.access_token(organization)?;
        with_deadline(
            self.timeout,
            "list group projects",
            self.list_group_projects(&organization.name, &token),
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
struct RawProject {
    id: u64,
    name: String,
    path_with_namespace: String,
    web_url: String,
}

impl From<RawProject> for ProviderRepository {
    fn from(p: RawProject) -> Self {
        ProviderRepository {
            external_id: ExternalRepoId(p.id),
            name: p.name,
            full_name: p.path_with_namespace,
            url: p.web_url,
        }
    }
}
