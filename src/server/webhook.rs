//! `POST /github/activity`: GitHub App webhook deliveries.
//!
//! The body is verified against the webhook secret before anything else is
//! looked at, then parsed and dispatched inline. The response carries the
//! per-item [`DispatchReport`].

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::{debug, warn};

use super::AppState;
use crate::types::DeliveryId;
use crate::webhooks::{DispatchReport, ParseError, parse_webhook, verify_signature};

/// Header name for GitHub event type.
const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
const HEADER_SIGNATURE: &str = "x-hub-signature-256";

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid payload: {0}")]
    Parse(#[from] ParseError),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebhookError::MissingHeader(_) => StatusCode::BAD_REQUEST,
            WebhookError::InvalidSignature => StatusCode::UNAUTHORIZED,
            WebhookError::Parse(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

/// Response body for a delivery whose event type is not handled.
fn ignored(event_type: &str) -> DispatchReport {
    DispatchReport {
        event: event_type.to_string(),
        action: String::new(),
        skipped: vec![format!("event {event_type} ignored")],
        ..Default::default()
    }
}

/// Responses:
///
/// - 200 with the dispatch report (unhandled event types included)
/// - 400 for a missing event header or an unparseable payload
/// - 401 for a missing or invalid signature
pub async fn webhook_handler(
    State(app_state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<DispatchReport>), WebhookError> {
    let delivery_id = DeliveryId::new(
        get_header(&headers, HEADER_DELIVERY).unwrap_or_else(|_| "unknown".to_string()),
    );

    let signature_header =
        get_header(&headers, HEADER_SIGNATURE).map_err(|_| WebhookError::InvalidSignature)?;
    if !verify_signature(&body, &signature_header, app_state.webhook_secret()) {
        warn!(delivery_id = %delivery_id, "Invalid webhook signature");
        return Err(WebhookError::InvalidSignature);
    }

    let event_type = get_header(&headers, HEADER_EVENT)?;
    debug!(delivery_id = %delivery_id, event_type = %event_type, "Received webhook");

    let event = match parse_webhook(&event_type, &body) {
        Ok(Some(event)) => event,
        Ok(None) => {
            debug!(delivery_id = %delivery_id, event_type = %event_type, "Ignoring event");
            return Ok((StatusCode::OK, Json(ignored(&event_type))));
        }
        Err(e) => {
            warn!(delivery_id = %delivery_id, event_type = %event_type, error = %e, "Malformed webhook payload");
            return Err(e.into());
        }
    };

    let report = app_state.dispatcher().dispatch(event).await;
    Ok((StatusCode::OK, Json(report)))
}

/// Extracts a required header value as a string.
fn get_header(headers: &HeaderMap, name: &'static str) -> Result<String, WebhookError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .ok_or(WebhookError::MissingHeader(name))
}
