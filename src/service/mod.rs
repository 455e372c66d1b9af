//! Service layer: business logic orchestration.
//!
//! [`OrderService`] drives checkout, the order status view, admin overrides
//! and token redemption. [`IngestionService`] applies provider webhook
//! events. Both run each state change inside one
//! [`UnitOfWork`](crate::persistence::UnitOfWork) and only dispatch
//! notifications after it committed.

pub mod ingestion;
pub mod order_service;
pub mod token_issuer;

use crate::domain::{DownloadToken, Order};
use crate::error::ShopError;
use crate::notify::DownloadReady;
use crate::persistence::UnitOfWork;

pub use ingestion::{EventOutcome, IngestionService};
pub use order_service::{Checkout, CheckoutSettings, NewOrder, OrderService, OrderView};
pub use token_issuer::{Redemption, TokenIssuer};

/// Public redemption URL for a token.
#[must_use]
pub fn download_url(app_url: &str, token: &str) -> String {
    format!("{}/api/download/{token}", app_url.trim_end_matches('/'))
}

/// Builds the "download ready" message for a freshly paid order.
///
/// Returns `None` (and logs) when the customer or photo row is gone; the
/// payment transition must not fail because of that.
pub(crate) async fn download_ready_message(
    uow: &mut dyn UnitOfWork,
    order: &Order,
    token: &DownloadToken,
    app_url: &str,
) -> Result<Option<DownloadReady>, ShopError> {
    let customer = uow.find_customer(order.customer_id).await?;
    let photo = uow.find_photo(order.photo_id).await?;
    let (Some(customer), Some(photo)) = (customer, photo) else {
        tracing::warn!(order_id = %order.id, "customer or photo missing; no notification");
        return Ok(None);
    };

    Ok(Some(DownloadReady {
        order_id: order.id,
        customer_name: customer.name,
        customer_email: customer.email,
        photo_title: photo.title,
        download_url: download_url(app_url, &token.token),
        expires_at: token.expires_at,
    }))
}
