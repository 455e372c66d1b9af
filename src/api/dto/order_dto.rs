//! Order DTOs for checkout, status polling and admin overrides.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{DownloadToken, OrderStatus, Photo};
use crate::service::{Checkout, NewOrder, OrderView};

/// Request body for `POST /api/orders`.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    /// Photo to buy.
    pub photo_id: uuid::Uuid,
    /// Buyer name (2 to 120 characters).
    pub customer_name: String,
    /// Buyer email.
    pub customer_email: String,
    /// Optional WhatsApp contact (at most 30 characters, `""` = none).
    #[serde(default)]
    pub customer_whatsapp: Option<String>,
}

impl From<CreateOrderRequest> for NewOrder {
    fn from(req: CreateOrderRequest) -> Self {
        Self {
            photo_id: req.photo_id,
            customer_name: req.customer_name,
            customer_email: req.customer_email,
            customer_whatsapp: req.customer_whatsapp,
        }
    }
}

/// Response body for `POST /api/orders`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    /// New order identifier.
    pub order_id: uuid::Uuid,
    /// Order status after the charge was created.
    pub status: OrderStatus,
    /// Copy-paste Pix code.
    pub br_code: String,
    /// QR code image reference.
    pub qr_code_image: String,
    /// Hosted payment page, when the provider offers one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_link_url: Option<String>,
    /// Charge expiry, when the provider reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<Checkout> for CheckoutResponse {
    fn from(checkout: Checkout) -> Self {
        Self {
            order_id: *checkout.order_id.as_uuid(),
            status: checkout.status,
            br_code: checkout.br_code,
            qr_code_image: checkout.qr_code_image,
            payment_link_url: checkout.payment_link_url,
            expires_at: checkout.expires_at,
        }
    }
}

/// Photo summary embedded in the order view.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PhotoSummaryDto {
    /// Display title.
    pub title: String,
    /// URL slug.
    pub slug: String,
    /// Watermarked preview.
    pub preview_url: String,
}

impl From<Photo> for PhotoSummaryDto {
    fn from(photo: Photo) -> Self {
        Self {
            title: photo.title,
            slug: photo.slug,
            preview_url: photo.preview_url,
        }
    }
}

/// Active download token embedded in the order view.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DownloadDto {
    /// Token string for `GET /api/download/{token}`.
    pub token: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
    /// Downloads left.
    pub remaining_downloads: i32,
}

impl From<DownloadToken> for DownloadDto {
    fn from(token: DownloadToken) -> Self {
        Self {
            token: token.token,
            expires_at: token.expires_at,
            remaining_downloads: token.remaining_downloads,
        }
    }
}

/// Response body for `GET /api/orders/{id}`.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    /// Order identifier.
    pub id: uuid::Uuid,
    /// Current status.
    pub status: OrderStatus,
    /// Price in minor currency units.
    pub amount_cents: i64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Payment confirmation timestamp.
    pub paid_at: Option<DateTime<Utc>>,
    /// Cancellation timestamp.
    pub canceled_at: Option<DateTime<Utc>>,
    /// Buyer name.
    pub customer_name: String,
    /// Buyer email.
    pub customer_email: String,
    /// Purchased photo.
    pub photo: PhotoSummaryDto,
    /// Active download token; `null` until the order is paid.
    pub download: Option<DownloadDto>,
}

impl From<OrderView> for OrderStatusResponse {
    fn from(view: OrderView) -> Self {
        Self {
            id: *view.order.id.as_uuid(),
            status: view.order.status,
            amount_cents: view.order.amount_cents,
            created_at: view.order.created_at,
            paid_at: view.order.paid_at,
            canceled_at: view.order.canceled_at,
            customer_name: view.customer.name,
            customer_email: view.customer.email,
            photo: view.photo.into(),
            download: view.download.map(DownloadDto::from),
        }
    }
}

/// Response body for the admin override endpoints.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminOrderResponse {
    /// Always `true` on success.
    pub ok: bool,
    /// Affected order.
    pub order_id: uuid::Uuid,
    /// Status after the override.
    pub status: OrderStatus,
}
