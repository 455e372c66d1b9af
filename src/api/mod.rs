//! REST API layer: route handlers, DTOs, and router composition.
//!
//! Resource endpoints are mounted under `/api`; `/health` sits at the root.
//! With the `swagger-ui` feature the OpenAPI document is served at
//! `/api-docs/openapi.json` and browsable at `/swagger-ui`.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::app_state::AppState;

/// OpenAPI document for every endpoint.
#[derive(Debug, OpenApi)]
#[openapi(
    info(title = "pix-checkout", description = "Pix checkout and download delivery for photo sales"),
    paths(
        handlers::orders::create_order,
        handlers::orders::get_order,
        handlers::admin::manual_paid,
        handlers::admin::cancel_order,
        handlers::webhook::openpix_webhook,
        handlers::download::download,
        handlers::system::health_handler,
    ),
    components(schemas(
        dto::CreateOrderRequest,
        dto::CheckoutResponse,
        dto::OrderStatusResponse,
        dto::PhotoSummaryDto,
        dto::DownloadDto,
        dto::AdminOrderResponse,
        dto::WebhookAck,
        handlers::system::HealthResponse,
        crate::domain::OrderStatus,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    modifiers(&BearerAuth),
    tags(
        (name = "Orders", description = "Checkout and order status"),
        (name = "Admin", description = "Manual overrides"),
        (name = "Webhooks", description = "Payment provider notifications"),
        (name = "Downloads", description = "Download token redemption"),
        (name = "System", description = "Liveness"),
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/orders",
            "/api/orders/{id}",
            "/api/orders/{id}/manual-paid",
            "/api/orders/{id}/cancel",
            "/api/pix/webhook/openpix",
            "/api/download/{token}",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
