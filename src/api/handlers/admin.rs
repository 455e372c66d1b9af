//! Admin overrides, authorized by `Authorization: Bearer <ADMIN_API_TOKEN>`.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};

use super::parse_order_id;
use crate::api::dto::AdminOrderResponse;
use crate::app_state::AppState;
use crate::error::{ErrorResponse, ShopError};
use crate::security::bearer_matches;

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ShopError> {
    if bearer_matches(headers, state.admin_token.as_deref()) {
        Ok(())
    } else {
        Err(ShopError::Unauthorized)
    }
}

/// `POST /orders/{id}/manual-paid`: Mark a pending order as paid.
///
/// # Errors
///
/// Returns [`ShopError::Unauthorized`] without a valid admin token and
/// [`ShopError::InvalidTransition`] for canceled or expired orders.
#[utoipa::path(
    post,
    path = "/api/orders/{id}/manual-paid",
    tag = "Admin",
    summary = "Manually mark an order as paid",
    description = "Admin override for payments confirmed outside the provider. Issues the download token and notifies the buyer once.",
    params(("id" = String, Path, description = "Order UUID")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Order is paid", body = AdminOrderResponse),
        (status = 401, description = "Missing or wrong admin token", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order is in a terminal state", body = ErrorResponse),
    )
)]
pub async fn manual_paid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ShopError> {
    authorize(&state, &headers)?;
    let order_id = parse_order_id(&id)?;
    let status = state.order_service.mark_paid_manually(order_id).await?;
    Ok(Json(AdminOrderResponse {
        ok: true,
        order_id: *order_id.as_uuid(),
        status,
    }))
}

/// `POST /orders/{id}/cancel`: Cancel a pending order.
///
/// # Errors
///
/// Returns [`ShopError::Unauthorized`] without a valid admin token and
/// [`ShopError::InvalidTransition`] for paid or expired orders.
#[utoipa::path(
    post,
    path = "/api/orders/{id}/cancel",
    tag = "Admin",
    summary = "Cancel an order",
    description = "Explicit cancellation of a PENDING order. Paid orders cannot be canceled.",
    params(("id" = String, Path, description = "Order UUID")),
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Order is canceled", body = AdminOrderResponse),
        (status = 401, description = "Missing or wrong admin token", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order is in a terminal state", body = ErrorResponse),
    )
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ShopError> {
    authorize(&state, &headers)?;
    let order_id = parse_order_id(&id)?;
    let status = state.order_service.cancel(order_id).await?;
    Ok(Json(AdminOrderResponse {
        ok: true,
        order_id: *order_id.as_uuid(),
        status,
    }))
}

/// Admin routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders/{id}/manual-paid", post(manual_paid))
        .route("/orders/{id}/cancel", post(cancel_order))
}
