//! `GET /gitlab/oauth/callback`: GitLab OAuth redirect target.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

use super::AppState;
use crate::error::ServiceError;

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
}

pub async fn oauth_callback(
    State(app_state): State<AppState>,
    Query(params): Query<CallbackParams>,
) -> Result<(StatusCode, String), ServiceError> {
    let authorization = app_state
        .gitlab_authorization()
        .ok_or_else(|| ServiceError::Internal("gitlab oauth is not configured".into()))?;

    let organization = authorization
        .complete(params.code.as_deref(), params.state.as_deref())
        .await?;

    Ok((
        StatusCode::OK,
        format!("gitlab group {} authorized", organization.name),
    ))
}
