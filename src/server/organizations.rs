//! Organization endpoints, mounted once per provider.
//!
//! - `GET    {base}`: reconciled view of the project's organizations
//! - `POST   {base}`: register an organization
//! - `PUT    {base}/{name}`: update auto-enable and branch protection
//! - `DELETE {base}/{name}`: disable its repositories and delete it

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, put};

use crate::error::ServiceError;
use crate::service::{AddOrganizationRequest, OrganizationService, UpdateOrganizationRequest};
use crate::types::{Organization, ProjectOrganizationView, ProjectSfid};

/// Header naming the user on whose behalf the request is made.
pub const HEADER_ACTOR: &str = "x-username";

/// Routes for one provider's organizations. `base` must contain a
/// `{project_sfid}` segment.
pub fn routes(base: &str, service: OrganizationService) -> Router {
    Router::new()
        .route(base, get(list_organizations).post(add_organization))
        .route(
            &format!("{base}/{{name}}"),
            put(update_organization).delete(delete_organization),
        )
        .with_state(service)
}

pub(crate) fn actor(headers: &HeaderMap) -> String {
    headers
        .get(HEADER_ACTOR)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("unknown")
        .to_string()
}

async fn list_organizations(
    State(service): State<OrganizationService>,
    Path(project_sfid): Path<String>,
) -> Result<Json<ProjectOrganizationView>, ServiceError> {
    let view = service
        .list_organizations(&ProjectSfid::new(project_sfid))
        .await?;
    Ok(Json(view))
}

async fn add_organization(
    State(service): State<OrganizationService>,
    Path(project_sfid): Path<String>,
    headers: HeaderMap,
    Json(request): Json<AddOrganizationRequest>,
) -> Result<Json<Organization>, ServiceError> {
    let organization = service
        .add_organization(&actor(&headers), &ProjectSfid::new(project_sfid), request)
        .await?;
    Ok(Json(organization))
}

async fn update_organization(
    State(service): State<OrganizationService>,
    Path((project_sfid, name)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<UpdateOrganizationRequest>,
) -> Result<Json<Organization>, ServiceError> {
    let organization = service
        .update_organization(
            &actor(&headers),
            &ProjectSfid::new(project_sfid),
            &name,
            request,
        )
        .await?;
    Ok(Json(organization))
}

async fn delete_organization(
    State(service): State<OrganizationService>,
    Path((project_sfid, name)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<StatusCode, ServiceError> {
    service
        .delete_organization(&actor(&headers), &ProjectSfid::new(project_sfid), &name)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
