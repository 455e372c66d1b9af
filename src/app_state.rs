//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::service::{IngestionService, OrderService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Checkout, status, admin and download operations.
    pub order_service: Arc<OrderService>,
    /// Webhook event processing.
    pub ingestion: Arc<IngestionService>,
    /// Shared secret for provider webhooks.
    pub webhook_secret: Option<Arc<str>>,
    /// Bearer token for admin endpoints.
    pub admin_token: Option<Arc<str>>,
}
