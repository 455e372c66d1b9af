//! Buyer-facing order handlers: checkout and status polling.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use super::parse_order_id;
use crate::api::dto::{CheckoutResponse, CreateOrderRequest, OrderStatusResponse};
use crate::app_state::AppState;
use crate::error::{ErrorResponse, ShopError};
use crate::service::NewOrder;

/// `POST /orders`: Create an order and its Pix charge.
///
/// # Errors
///
/// Returns [`ShopError`] on invalid input, unknown photo or provider
/// failure.
#[utoipa::path(
    post,
    path = "/api/orders",
    tag = "Orders",
    summary = "Create an order",
    description = "Validates the buyer, creates a PENDING order for a published photo and asks the payment provider for a Pix charge. A charge failure cancels the order.",
    request_body = CreateOrderRequest,
    responses(
        (status = 200, description = "Charge created", body = CheckoutResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Photo not found", body = ErrorResponse),
        (status = 422, description = "Provider rejected the charge", body = ErrorResponse),
        (status = 502, description = "Provider unavailable", body = ErrorResponse),
        (status = 503, description = "Provider not configured", body = ErrorResponse),
    )
)]
pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ShopError> {
    let Json(req) = payload.map_err(|rejection| match rejection {
        JsonRejection::JsonDataError(e) => ShopError::Validation(e.body_text()),
        other => ShopError::InvalidJson(other.body_text()),
    })?;

    let checkout = state
        .order_service
        .create_order(&NewOrder::from(req))
        .await?;
    Ok(Json(CheckoutResponse::from(checkout)))
}

/// `GET /orders/{id}`: Order status view.
///
/// # Errors
///
/// Returns [`ShopError::OrderNotFound`] if the order does not exist.
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    tag = "Orders",
    summary = "Get order status",
    description = "Returns the order with buyer and photo summary. A paid order always carries an active download token; one is issued on demand if needed.",
    params(("id" = String, Path, description = "Order UUID")),
    responses(
        (status = 200, description = "Order status", body = OrderStatusResponse),
        (status = 400, description = "Malformed order ID", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ShopError> {
    let order_id = parse_order_id(&id)?;
    let view = state.order_service.order_view(order_id).await?;
    Ok(Json(OrderStatusResponse::from(view)))
}

/// Order routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{id}", get(get_order))
}
