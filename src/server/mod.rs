//! HTTP surface of the service.
//!
//! # Endpoints
//!
//! - `GET/POST /project/{project_sfid}/organizations`,
//!   `PUT/DELETE /project/{project_sfid}/organizations/{name}`: GitHub
//!   organizations
//! - the same under `/project/{project_sfid}/gitlab/organizations`: GitLab
//!   groups
//! - `GET/POST/DELETE /signatures/{signature_id}/gh-org-whitelist`: GitHub
//!   organization approval list of a signature
//! - `POST /github/activity`: GitHub App webhooks
//! - `GET /gitlab/oauth/callback`: GitLab OAuth redirect
//! - `GET /health`: liveness

use std::sync::Arc;

pub mod approval;
pub mod health;
pub mod oauth;
pub mod organizations;
pub mod webhook;

pub use health::health_handler;
pub use oauth::oauth_callback;
pub use webhook::webhook_handler;

use crate::service::{ApprovalListService, GitLabAuthorization, OrganizationService};
use crate::webhooks::WebhookDispatcher;

/// Shared application state, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    github: OrganizationService,
    gitlab: OrganizationService,
    approvals: ApprovalListService,
    dispatcher: WebhookDispatcher,
    /// `None` when no GitLab OAuth application is configured.
    gitlab_authorization: Option<GitLabAuthorization>,
    webhook_secret: Vec<u8>,
}

impl AppState {
    pub fn new(
        github: OrganizationService,
        gitlab: OrganizationService,
        approvals: ApprovalListService,
        dispatcher: WebhookDispatcher,
        gitlab_authorization: Option<GitLabAuthorization>,
        webhook_secret: impl Into<Vec<u8>>,
    ) -> Self {
        AppState {
            inner: Arc::new(AppStateInner {
                github,
                gitlab,
                approvals,
                dispatcher,
                gitlab_authorization,
                webhook_secret: webhook_secret.into(),
            }),
        }
    }

    pub fn github(&self) -> &OrganizationService {
        &self.inner.github
    }

    pub fn gitlab(&self) -> &OrganizationService {
        &self.inner.gitlab
    }

    pub fn approvals(&self) -> &ApprovalListService {
        &self.inner.approvals
    }

    pub fn dispatcher(&self) -> &WebhookDispatcher {
        &self.inner.dispatcher
    }

    pub fn gitlab_authorization(&self) -> Option<&GitLabAuthorization> {
        self.inner.gitlab_authorization.as_ref()
    }

    pub fn webhook_secret(&self) -> &[u8] {
        &self.inner.webhook_secret
    }
}

/// Builds the axum Router with all endpoints.
pub fn build_router(app_state: AppState) -> axum::Router {
    use axum::routing::{get, post};

    let github = organizations::routes(
        "/project/{project_sfid}/organizations",
        app_state.github().clone(),
    );
    let gitlab = organizations::routes(
        "/project/{project_sfid}/gitlab/organizations",
        app_state.gitlab().clone(),
    );
    let approvals = approval::routes(app_state.approvals().clone());

    axum::Router::new()
        .route("/github/activity", post(webhook_handler))
        .route("/gitlab/oauth/callback", get(oauth_callback))
        .route("/health", get(health_handler))
        .with_state(app_state)
        .merge(github)
        .merge(gitlab)
        .merge(approvals)
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crate::audit::MemoryAuditLog;
    use crate::directory::{LoggingNotifier, StaticClaGroupDirectory};
    use crate::provider::TokenCipher;
    use crate::reconcile::Reconciler;
    use crate::store::{
        MemoryOrganizationStore, MemoryRepositoryStore, MemorySignatureStore, OrganizationStore,
        RepositoryStore, SignatureStore,
    };
    use crate::test_utils::{FakeProjectDirectory, FakeProvider, FakeTokenExchange, gitlab_org};
    use crate::types::{ClaGroupId, ExternalRepoId, ProviderRepository, Provider, Signature, SignatureId};
    use crate::webhooks::sign_payload;

    const SECRET: &[u8] = b"webhook-secret";

    struct Harness {
        github_orgs: Arc<MemoryOrganizationStore>,
        gitlab_orgs: Arc<MemoryOrganizationStore>,
        repos: Arc<MemoryRepositoryStore>,
        signatures: Arc<MemorySignatureStore>,
        provider: Arc<FakeProvider>,
        audit: Arc<MemoryAuditLog>,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                github_orgs: Arc::new(MemoryOrganizationStore::new()),
                gitlab_orgs: Arc::new(MemoryOrganizationStore::new()),
                repos: Arc::new(MemoryRepositoryStore::new()),
                signatures: Arc::new(MemorySignatureStore::new()),
                provider: Arc::new(FakeProvider::new()),
                audit: Arc::new(MemoryAuditLog::new()),
            }
        }

        fn service(&self, provider: Provider) -> OrganizationService {
            let orgs = match provider {
                Provider::Github => self.github_orgs.clone(),
                Provider::Gitlab => self.gitlab_orgs.clone(),
            };
            let projects = FakeProjectDirectory::new()
                .with_project("p1", "p1")
                .with_project("p2", "p2");
            let reconciler = Reconciler::new(
                orgs.clone(),
                self.repos.clone(),
                self.provider.clone(),
                Arc::new(StaticClaGroupDirectory::new().with_group("g1", "Group One")),
            );
            OrganizationService::new(
                provider,
                orgs,
                self.repos.clone(),
                Arc::new(projects),
                self.audit.clone(),
                reconciler,
            )
        }

        fn router(&self, authorization: Option<GitLabAuthorization>) -> axum::Router {
            let dispatcher = WebhookDispatcher::new(
                self.github_orgs.clone(),
                self.repos.clone(),
                self.provider.clone(),
                Arc::new(LoggingNotifier),
                self.audit.clone(),
            );
            build_router(AppState::new(
                self.service(Provider::Github),
                self.service(Provider::Gitlab),
                ApprovalListService::new(self.signatures.clone(), self.audit.clone()),
                dispatcher,
                authorization,
                SECRET,
            ))
        }

        fn authorization(&self, accepted_code: String) -> GitLabAuthorization {
            GitLabAuthorization::new(
                self.gitlab_orgs.clone(),
                Arc::new(FakeTokenExchange { accepted_code }),
                Arc::new(TokenCipher::new(&[3u8; 32]).unwrap()),
                self.audit.clone(),
            )
        }
    }

    fn webhook_request(event_type: &str, body: &str, secret: &[u8]) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/github/activity")
            .header("x-github-event", event_type)
            .header("x-github-delivery", "d-1")
            .header(
                "x-hub-signature-256",
                sign_payload(body.as_bytes(), secret).unwrap(),
            )
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .header(organizations::HEADER_ACTOR, "alice")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    // ─── Health tests ───

    #[tokio::test]
    async fn health_endpoint_returns_200() {
        let app = Harness::new().router(None);
        let response = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"OK");
    }

    // ─── Organization endpoint tests ───

    #[tokio::test]
    async fn add_then_list_github_organization() {
        let h = Harness::new();
        let app = h.router(None);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/project/p1/organizations",
                json!({ "organizationName": "acme", "autoEnabled": false }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let created = body_json(response).await;
        assert_eq!(created["name"], "acme");

        let response = app
            .oneshot(get("/project/p1/organizations"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let view = body_json(response).await;
        assert_eq!(view["project_sfid"], "p1");
        assert_eq!(view["organizations"][0]["organization_name"], "acme");
        assert_eq!(
            view["organizations"][0]["connection_status"],
            "no_connection"
        );
    }

    #[tokio::test]
    async fn duplicate_name_in_other_project_conflicts() {
        let h = Harness::new();
        let app = h.router(None);
        let add = |project: &str| {
            json_request(
                "POST",
                &format!("/project/{project}/organizations"),
                json!({ "organization_name": "acme", "auto_enabled": false }),
            )
        };

        let first = app.clone().oneshot(add("p1")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let second = app.oneshot(add("p2")).await.unwrap();
        assert_eq!(second.status(), StatusCode::CONFLICT);
        let body = body_json(second).await;
        assert_eq!(body["code"], 409);
    }

    #[tokio::test]
    async fn invalid_add_is_400() {
        let app = Harness::new().router(None);
        let response = app
            .oneshot(json_request(
                "POST",
                "/project/p1/organizations",
                json!({ "organization_name": "acme", "auto_enabled": true }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_and_delete_round() {
        let h = Harness::new();
        let app = h.router(None);
        app.clone()
            .oneshot(json_request(
                "POST",
                "/project/p1/organizations",
                json!({ "organization_name": "acme", "auto_enabled": false }),
            ))
            .await
            .unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                "/project/p1/organizations/acme",
                json!({ "autoEnabled": true, "autoEnabledClaGroupID": "g1" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body_json(response).await;
        assert_eq!(updated["auto_enabled"], true);

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri("/project/p1/organizations/acme")
                .body(Body::empty())
                .unwrap()
        };
        let response = app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app.oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn gitlab_routes_use_the_gitlab_store() {
        let h = Harness::new();
        let app = h.router(None);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/project/p1/gitlab/organizations",
                json!({ "organization_name": "group", "auto_enabled": false }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        assert!(h.gitlab_orgs.get_organization_by_name("group").await.unwrap().is_some());
        assert!(h.github_orgs.get_organization_by_name("group").await.unwrap().is_none());

        let github_view = body_json(
            app.oneshot(get("/project/p1/organizations")).await.unwrap(),
        )
        .await;
        assert_eq!(github_view["organizations"], json!([]));
    }

    #[tokio::test]
    async fn provider_failure_degrades_only_that_organization() {
        let h = Harness::new();
        h.github_orgs
            .put_organization(&crate::test_utils::installed_github_org("acme", "p1", 3))
            .await
            .unwrap();
        h.provider.fail_for("acme");
        let app = h.router(None);

        let response = app.oneshot(get("/project/p1/organizations")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let view = body_json(response).await;
        assert_eq!(
            view["organizations"][0]["connection_status"],
            "connection_failure"
        );
    }

    // ─── Webhook endpoint tests ───

    #[tokio::test]
    async fn signed_delivery_is_dispatched() {
        let h = Harness::new();
        h.github_orgs
            .put_organization(&crate::test_utils::auto_enabled_github_org(
                "acme", "p1", "g1",
            ))
            .await
            .unwrap();
        h.provider
            .set_repositories("acme", vec![ProviderRepository::new(5, "api")]);
        let app = h.router(None);

        let body = json!({
            "action": "added",
            "installation": { "id": 1 },
            "repositories_added": [{ "id": 5, "name": "api", "full_name": "acme/api" }],
            "repositories_removed": [],
            "sender": { "login": "octocat" }
        })
        .to_string();

        let response = app
            .oneshot(webhook_request("installation_repositories", &body, SECRET))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["applied"].as_array().map(Vec::len), Some(1));

        let stored = h
            .repos
            .get_repository_by_external_id(Provider::Github, ExternalRepoId(5), true)
            .await
            .unwrap()
            .unwrap();
        assert!(stored.enabled);
        assert_eq!(h.audit.entries().len(), 1);
    }

    #[tokio::test]
    async fn bad_signature_is_401() {
        let app = Harness::new().router(None);
        let response = app
            .oneshot(webhook_request("repository", "{}", b"wrong"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_signature_is_401() {
        let app = Harness::new().router(None);
        let request = Request::builder()
            .method("POST")
            .uri("/github/activity")
            .header("x-github-event", "repository")
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_event_header_is_400() {
        let app = Harness::new().router(None);
        let request = Request::builder()
            .method("POST")
            .uri("/github/activity")
            .header("x-hub-signature-256", sign_payload(b"{}", SECRET).unwrap())
            .body(Body::from("{}"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn malformed_payload_is_400() {
        let app = Harness::new().router(None);
        let response = app
            .oneshot(webhook_request("repository", "{not json", SECRET))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unhandled_event_is_acknowledged() {
        let app = Harness::new().router(None);
        let response = app
            .oneshot(webhook_request("star", r#"{"action":"created"}"#, SECRET))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let report = body_json(response).await;
        assert_eq!(report["event"], "star");
    }

    // ─── OAuth callback tests ───

    #[tokio::test]
    async fn oauth_callback_stores_credentials() {
        let h = Harness::new();
        let org = gitlab_org("group", "p1");
        h.gitlab_orgs.put_organization(&org).await.unwrap();
        let code = format!("{}:state-1", org.id);
        let app = h.router(Some(h.authorization(code.clone())));

        let response = app
            .oneshot(get(&format!(
                "/gitlab/oauth/callback?code={}&state=state-1",
                urlencoding::encode(&code)
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let stored = h.gitlab_orgs.get_organization(&org.id).await.unwrap().unwrap();
        assert!(stored.auth_info.is_some());
    }

    #[tokio::test]
    async fn oauth_callback_rejects_mismatched_state() {
        let h = Harness::new();
        let org = gitlab_org("group", "p1");
        h.gitlab_orgs.put_organization(&org).await.unwrap();
        let app = h.router(Some(h.authorization(String::new())));

        let code = format!("{}:other", org.id);
        let response = app
            .oneshot(get(&format!(
                "/gitlab/oauth/callback?code={}&state=other",
                urlencoding::encode(&code)
            )))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn oauth_callback_without_configuration_is_500() {
        let app = Harness::new().router(None);
        let response = app
            .oneshot(get("/gitlab/oauth/callback?code=a:b&state=b"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    // ─── Approval list endpoint tests ───

    fn seed_signature(h: &Harness) {
        h.signatures.insert(Signature {
            id: SignatureId::from("sig-1"),
            cla_group_id: ClaGroupId::from("g1"),
            company_id: Some("company-1".into()),
            github_org_approval_list: vec!["acme".into()],
        });
    }

    #[tokio::test]
    async fn approval_list_add_then_delete() {
        let h = Harness::new();
        seed_signature(&h);
        let app = h.router(None);
        let uri = "/signatures/sig-1/gh-org-whitelist";

        let response = app
            .clone()
            .oneshot(json_request("POST", uri, json!({ "organization_id": "widgets" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!([
                { "id": "acme", "selected": true },
                { "id": "widgets", "selected": true }
            ])
        );

        let response = app
            .clone()
            .oneshot(json_request("DELETE", uri, json!({ "organizationId": "acme" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app.oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await,
            json!([{ "id": "widgets", "selected": true }])
        );

        let stored = h
            .signatures
            .get_signature(&SignatureId::from("sig-1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.github_org_approval_list, ["widgets"]);
        let actors: Vec<_> = h.audit.entries().into_iter().map(|e| e.actor).collect();
        assert_eq!(actors, ["alice", "alice"]);
    }

    #[tokio::test]
    async fn approval_list_rejects_unknown_signature_and_blank_name() {
        let h = Harness::new();
        seed_signature(&h);
        let app = h.router(None);

        let response = app
            .clone()
            .oneshot(get("/signatures/missing/gh-org-whitelist"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(json_request(
                "POST",
                "/signatures/sig-1/gh-org-whitelist",
                json!({ "organization_id": "" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(h.audit.events().is_empty());
    }
}
