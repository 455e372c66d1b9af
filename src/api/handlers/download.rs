//! Download token redemption.

use axum::Router;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;

use crate::app_state::AppState;
use crate::error::{ErrorResponse, ShopError};

/// `GET /download/{token}`: Redeem one download.
///
/// # Errors
///
/// Returns [`ShopError::TokenNotFound`] (404) or [`ShopError::TokenGone`]
/// (410).
#[utoipa::path(
    get,
    path = "/api/download/{token}",
    tag = "Downloads",
    summary = "Redeem a download token",
    description = "Consumes one use of the token and redirects to a short-lived signed URL of the original file.",
    params(("token" = String, Path, description = "Download token")),
    responses(
        (status = 302, description = "Redirect to the signed original"),
        (status = 404, description = "Unknown token", body = ErrorResponse),
        (status = 410, description = "Token expired, exhausted or order not paid", body = ErrorResponse),
    )
)]
pub async fn download(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ShopError> {
    let url = state.order_service.redeem(&token).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, url)]))
}

/// Download routes.
pub fn routes() -> Router<AppState> {
    Router::new().route("/download/{token}", get(download))
}
