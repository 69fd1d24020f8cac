//! Signature approval list endpoints.
//!
//! - `GET    /signatures/{signature_id}/gh-org-whitelist`: approved GitHub
//!   organizations
//! - `POST   /signatures/{signature_id}/gh-org-whitelist`: approve one
//! - `DELETE /signatures/{signature_id}/gh-org-whitelist`: revoke one
//!
//! Changes answer with the resulting list.

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::get;

use super::organizations::actor;
use crate::error::ServiceError;
use crate::service::{ApprovalListRequest, ApprovalListService};
use crate::types::{ApprovedOrganization, SignatureId};

pub fn routes(service: ApprovalListService) -> Router {
    Router::new()
        .route(
            "/signatures/{signature_id}/gh-org-whitelist",
            get(list_github_organizations)
                .post(add_github_organization)
                .delete(delete_github_organization),
        )
        .with_state(service)
}

async fn list_github_organizations(
    State(service): State<ApprovalListService>,
    Path(signature_id): Path<String>,
) -> Result<Json<Vec<ApprovedOrganization>>, ServiceError> {
    let list = service
        .github_organizations(&SignatureId::new(signature_id))
        .await?;
    Ok(Json(list))
}

async fn add_github_organization(
    State(service): State<ApprovalListService>,
    Path(signature_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ApprovalListRequest>,
) -> Result<Json<Vec<ApprovedOrganization>>, ServiceError> {
    let list = service
        .add_github_organization(&actor(&headers), &SignatureId::new(signature_id), request)
        .await?;
    Ok(Json(list))
}

async fn delete_github_organization(
    State(service): State<ApprovalListService>,
    Path(signature_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<ApprovalListRequest>,
) -> Result<Json<Vec<ApprovedOrganization>>, ServiceError> {
    let list = service
        .delete_github_organization(&actor(&headers), &SignatureId::new(signature_id), request)
        .await?;
    Ok(Json(list))
}
