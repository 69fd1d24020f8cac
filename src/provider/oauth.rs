//! GitLab OAuth authorization-code exchange.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ProviderError, TokenExchange, with_deadline};

/// Token set returned by GitLab's `/oauth/token`. Stored encrypted on the
/// organization record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCredentials {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: i64,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default)]
    pub created_at: i64,
}

/// OAuth application credentials plus the endpoint to exchange codes at.
#[derive(Debug, Clone)]
pub struct GitLabOAuth {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    timeout: Duration,
}

impl GitLabOAuth {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            token_url: format!("{}/oauth/token", base_url.trim_end_matches('/')),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            timeout,
        }
    }

    async fn request_token(&self, code: &str) -> Result<OAuthCredentials, ProviderError> {
        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                format!("token exchange rejected: {body}"),
            ));
        }

        response
            .json::<OAuthCredentials>()
            .await
            .map_err(|e| ProviderError::Other(format!("undecodable token response: {e}")))
    }
}

#[async_trait]
impl TokenExchange for GitLabOAuth {
    async fn exchange_code(&self, code: &str) -> Result<OAuthCredentials, ProviderError> {
        let credentials =
            with_deadline(self.timeout, "exchange oauth code", self.request_token(code)).await?;
        info!(token_type = %credentials.token_type, "Exchanged GitLab OAuth code");
        Ok(credentials)
    }
}
