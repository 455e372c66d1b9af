//! Payment provider webhook receiver.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::WebhookAck;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, ShopError};
use crate::security::validate_webhook;

/// `POST /pix/webhook/openpix`: Ingest an OpenPix notification.
///
/// Authentication runs on the raw body before any parsing.
///
/// # Errors
///
/// Returns [`ShopError::Unauthorized`] for a missing or wrong secret and
/// [`ShopError::InvalidJson`] for a body that is not JSON.
#[utoipa::path(
    post,
    path = "/api/pix/webhook/openpix",
    tag = "Webhooks",
    summary = "OpenPix webhook",
    description = "Accepts a single event, `{events: [...]}` or `{charges: [...]}`. Each event is applied idempotently; redeliveries are acknowledged without effect.",
    request_body(content = String, content_type = "application/json", description = "Raw provider JSON"),
    responses(
        (status = 200, description = "Batch accepted", body = WebhookAck),
        (status = 400, description = "Body is not JSON", body = ErrorResponse),
        (status = 401, description = "Webhook authentication failed", body = ErrorResponse),
    )
)]
pub async fn openpix_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ShopError> {
    if !validate_webhook(&headers, &body, state.webhook_secret.as_deref()) {
        tracing::warn!(bytes = body.len(), "rejected unauthenticated webhook");
        return Err(ShopError::Unauthorized);
    }

    let payload: serde_json::Value =
        serde_json::from_slice(&body).map_err(|e| ShopError::InvalidJson(e.to_string()))?;

    let processed = state.ingestion.process_payload(&payload).await;
    tracing::info!(processed, "webhook batch processed");
    Ok(Json(WebhookAck {
        ok: true,
        processed,
    }))
}

/// Webhook routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/pix/webhook/openpix", post(openpix_webhook))
}
