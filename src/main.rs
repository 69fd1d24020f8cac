use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cla_connect::audit::{AuditLog, DynamoAuditLog, TracingAuditLog};
use cla_connect::config::{AppConfig, StoreBackend};
use cla_connect::directory::{
    ClaGroupDirectory, DynamoClaGroupDirectory, HttpProjectDirectory, LoggingNotifier,
    ProjectDirectory, StandaloneProjectDirectory, StaticClaGroupDirectory,
};
use cla_connect::provider::{GitHubClient, GitLabClient, GitLabOAuth, ProviderClient, TokenCipher};
use cla_connect::reconcile::Reconciler;
use cla_connect::server::{AppState, build_router};
use cla_connect::service::{ApprovalListService, GitLabAuthorization, OrganizationService};
use cla_connect::store::{
    DynamoOrganizationStore, DynamoRepositoryStore, DynamoSignatureStore,
    MemoryOrganizationStore, MemoryRepositoryStore, MemorySignatureStore, OrganizationStore,
    RepositoryStore, SignatureStore,
};
use cla_connect::types::Provider;
use cla_connect::webhooks::WebhookDispatcher;

/// Storage-backed collaborators, chosen by `CLA_STORE`.
struct Backends {
    github_orgs: Arc<dyn OrganizationStore>,
    gitlab_orgs: Arc<dyn OrganizationStore>,
    repositories: Arc<dyn RepositoryStore>,
    signatures: Arc<dyn SignatureStore>,
    cla_groups: Arc<dyn ClaGroupDirectory>,
    audit: Arc<dyn AuditLog>,
}

async fn backends(config: &AppConfig) -> Backends {
    match config.store {
        StoreBackend::Dynamo => {
            let aws = aws_config::load_from_env().await;
            let client = aws_sdk_dynamodb::Client::new(&aws);
            Backends {
                github_orgs: Arc::new(DynamoOrganizationStore::new(
                    client.clone(),
                    config.table("github-orgs"),
                    Provider::Github,
                )),
                gitlab_orgs: Arc::new(DynamoOrganizationStore::new(
                    client.clone(),
                    config.table("gitlab-orgs"),
                    Provider::Gitlab,
                )),
                repositories: Arc::new(DynamoRepositoryStore::new(
                    client.clone(),
                    config.table("repositories"),
                )),
                signatures: Arc::new(DynamoSignatureStore::new(
                    client.clone(),
                    config.table("signatures"),
                )),
                cla_groups: Arc::new(DynamoClaGroupDirectory::new(
                    client.clone(),
                    config.table("projects"),
                )),
                audit: Arc::new(DynamoAuditLog::new(client, config.table("events"))),
            }
        }
        StoreBackend::Memory => Backends {
            github_orgs: Arc::new(MemoryOrganizationStore::new()),
            gitlab_orgs: Arc::new(MemoryOrganizationStore::new()),
            repositories: Arc::new(MemoryRepositoryStore::new()),
            signatures: Arc::new(MemorySignatureStore::new()),
            cla_groups: Arc::new(StaticClaGroupDirectory::new()),
            audit: Arc::new(TracingAuditLog),
        },
    }
}

async fn build_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let backends = backends(config).await;
    let http = reqwest::Client::builder()
        .user_agent("cla-connect")
        .build()
        .context("building HTTP client")?;

    let github = Arc::new(
        GitHubClient::from_app_key(
            config.github.app_id,
            &config.github.private_key_pem,
            config.provider_timeout,
        )
        .context("building GitHub App client")?,
    );
    let cipher = Arc::new(
        TokenCipher::from_base64(&config.gitlab.token_key)
            .context("loading GitLab token encryption key")?,
    );
    let gitlab = Arc::new(GitLabClient::new(
        http.clone(),
        &config.gitlab.base_url,
        cipher.clone(),
        config.provider_timeout,
    ));

    let projects: Arc<dyn ProjectDirectory> = match &config.project_service_url {
        Some(url) => Arc::new(HttpProjectDirectory::new(
            http.clone(),
            url,
            config.provider_timeout,
        )),
        None => Arc::new(StandaloneProjectDirectory),
    };

    let service = |provider: Provider,
                   orgs: &Arc<dyn OrganizationStore>,
                   client: Arc<dyn ProviderClient>| {
        OrganizationService::new(
            provider,
            orgs.clone(),
            backends.repositories.clone(),
            projects.clone(),
            backends.audit.clone(),
            Reconciler::new(
                orgs.clone(),
                backends.repositories.clone(),
                client,
                backends.cla_groups.clone(),
            ),
        )
    };
    let github_service = service(
        Provider::Github,
        &backends.github_orgs,
        github.clone() as Arc<dyn ProviderClient>,
    );
    let gitlab_service = service(
        Provider::Gitlab,
        &backends.gitlab_orgs,
        gitlab as Arc<dyn ProviderClient>,
    );

    let gitlab_authorization = config.gitlab.oauth.as_ref().map(|oauth| {
        GitLabAuthorization::new(
            backends.gitlab_orgs.clone(),
            Arc::new(GitLabOAuth::new(
                http.clone(),
                &config.gitlab.base_url,
                oauth.client_id.clone(),
                oauth.client_secret.clone(),
                oauth.redirect_uri.clone(),
                config.provider_timeout,
            )),
            cipher.clone(),
            backends.audit.clone(),
        )
    });
    if gitlab_authorization.is_none() {
        tracing::warn!("GitLab OAuth is not configured; the callback endpoint will fail");
    }

    let dispatcher = WebhookDispatcher::new(
        backends.github_orgs.clone(),
        backends.repositories.clone(),
        github,
        Arc::new(LoggingNotifier),
        backends.audit.clone(),
    );

    let approvals = ApprovalListService::new(backends.signatures.clone(), backends.audit.clone());

    Ok(AppState::new(
        github_service,
        gitlab_service,
        approvals,
        dispatcher,
        gitlab_authorization,
        config.github.webhook_secret.clone(),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cla_connect=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;
    let app = build_router(build_state(&config).await?);

    tracing::info!(
        stage = %config.stage,
        store = ?config.store,
        "listening on {}",
        config.listen_addr
    );

    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}
