//! Process configuration from `CLA_*` environment variables.
//!
//! | Variable | Default |
//! |---|---|
//! | `CLA_STAGE` | `dev` |
//! | `CLA_LISTEN_ADDR` | `0.0.0.0:3000` |
//! | `CLA_STORE` (`dynamodb` or `memory`) | `dynamodb` |
//! | `CLA_PROVIDER_TIMEOUT_SECS` | `10` |
//! | `CLA_GITHUB_APP_ID` | required |
//! | `CLA_GITHUB_PRIVATE_KEY_PATH` | required |
//! | `CLA_GITHUB_WEBHOOK_SECRET` | required |
//! | `CLA_GITLAB_BASE_URL` | `https://gitlab.com` |
//! | `CLA_GITLAB_TOKEN_KEY` (base64, 32 bytes) | required |
//! | `CLA_GITLAB_CLIENT_ID`, `CLA_GITLAB_CLIENT_SECRET`, `CLA_GITLAB_REDIRECT_URI` | OAuth disabled unless all set |
//! | `CLA_PROJECT_SERVICE_URL` | unset: every project is its own parent |

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Dynamo,
    Memory,
}

#[derive(Clone)]
pub struct GitHubConfig {
    pub app_id: u64,
    pub private_key_pem: Vec<u8>,
    pub webhook_secret: String,
}

/// OAuth application registered with GitLab.
#[derive(Clone)]
pub struct GitLabOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Clone)]
pub struct GitLabConfig {
    pub base_url: String,
    pub token_key: String,
    pub oauth: Option<GitLabOAuthConfig>,
}

#[derive(Clone)]
pub struct AppConfig {
    pub stage: String,
    pub listen_addr: SocketAddr,
    pub store: StoreBackend,
    pub provider_timeout: Duration,
    pub github: GitHubConfig,
    pub gitlab: GitLabConfig,
    pub project_service_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| optional(name).ok_or(ConfigError::Missing(name));

        let listen_addr = match optional("CLA_LISTEN_ADDR") {
            Some(addr) => addr.parse().map_err(|e| ConfigError::Invalid {
                var: "CLA_LISTEN_ADDR",
                reason: format!("{e}"),
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 3000)),
        };

        let store = match optional("CLA_STORE").as_deref() {
            None | Some("dynamodb") => StoreBackend::Dynamo,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "CLA_STORE",
                    reason: format!("expected dynamodb or memory, got {other}"),
                });
            }
        };

        let provider_timeout = match optional("CLA_PROVIDER_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(secs.parse().map_err(|e| ConfigError::Invalid {
                var: "CLA_PROVIDER_TIMEOUT_SECS",
                reason: format!("{e}"),
            })?),
            None => Duration::from_secs(10),
        };

        let app_id = required("CLA_GITHUB_APP_ID")?
            .parse()
            .map_err(|e| ConfigError::Invalid {
                var: "CLA_GITHUB_APP_ID",
                reason: format!("{e}"),
            })?;
        let key_path = PathBuf::from(required("CLA_GITHUB_PRIVATE_KEY_PATH")?);
        let private_key_pem = std::fs::read(&key_path).map_err(|source| ConfigError::Io {
            path: key_path.clone(),
            source,
        })?;

        let oauth = match (
            optional("CLA_GITLAB_CLIENT_ID"),
            optional("CLA_GITLAB_CLIENT_SECRET"),
            optional("CLA_GITLAB_REDIRECT_URI"),
        ) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(GitLabOAuthConfig {
                client_id,
                client_secret,
                redirect_uri,
            }),
            _ => None,
        };

        Ok(AppConfig {
            stage: optional("CLA_STAGE").unwrap_or_else(|| "dev".to_string()),
            listen_addr,
            store,
            provider_timeout,
            github: GitHubConfig {
                app_id,
                private_key_pem,
                webhook_secret: required("CLA_GITHUB_WEBHOOK_SECRET")?,
            },
            gitlab: GitLabConfig {
                base_url: optional("CLA_GITLAB_BASE_URL")
                    .unwrap_or_else(|| "https://gitlab.com".to_string()),
                token_key: required("CLA_GITLAB_TOKEN_KEY")?,
                oauth,
            },
            project_service_url: optional("CLA_PROJECT_SERVICE_URL"),
        })
    }

    /// Stage-qualified DynamoDB table name, e.g. `cla-dev-repositories`.
    pub fn table(&self, suffix: &str) -> String {
        format!("cla-{}-{}", self.stage, suffix)
    }
}
