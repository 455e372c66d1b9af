//! Database row models and their conversion into domain types.

use chrono::{DateTime, Utc};
use sqlx::FromRow;

use crate::domain::{Customer, DownloadToken, Order, OrderId, Photo};
use crate::error::ShopError;

/// A row from the `orders` table.
#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
    /// Primary key.
    pub id: uuid::Uuid,
    /// Photo foreign key.
    pub photo_id: uuid::Uuid,
    /// Customer foreign key.
    pub customer_id: uuid::Uuid,
    /// Status label (`PENDING`, `PAID`, `CANCELED`, `EXPIRED`).
    pub status: String,
    /// Amount in minor units.
    pub amount_cents: i64,
    /// Provider name.
    pub provider: String,
    /// Provider charge ID.
    pub provider_charge_id: Option<String>,
    /// Provider correlation ID.
    pub provider_correlation_id: Option<String>,
    /// Last provider payload (JSONB).
    pub provider_raw: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Payment timestamp.
    pub paid_at: Option<DateTime<Utc>>,
    /// Cancellation timestamp.
    pub canceled_at: Option<DateTime<Utc>>,
}

impl TryFrom<OrderRow> for Order {
    type Error = ShopError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: OrderId::from_uuid(row.id),
            photo_id: row.photo_id,
            customer_id: row.customer_id,
            status: row.status.parse().map_err(ShopError::Persistence)?,
            amount_cents: row.amount_cents,
            provider: row.provider,
            provider_charge_id: row.provider_charge_id,
            provider_correlation_id: row.provider_correlation_id,
            provider_raw: row.provider_raw,
            created_at: row.created_at,
            paid_at: row.paid_at,
            canceled_at: row.canceled_at,
        })
    }
}

/// A row from the `customers` table.
#[derive(Debug, Clone, FromRow)]
pub struct CustomerRow {
    /// Primary key.
    pub id: uuid::Uuid,
    /// Display name.
    pub name: String,
    /// Lower-cased email (unique).
    pub email: String,
    /// Optional WhatsApp contact.
    pub whatsapp: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            whatsapp: row.whatsapp,
            created_at: row.created_at,
        }
    }
}

/// A row from the `photos` table (columns used by checkout only).
#[derive(Debug, Clone, FromRow)]
pub struct PhotoRow {
    /// Primary key.
    pub id: uuid::Uuid,
    /// URL slug.
    pub slug: String,
    /// Title.
    pub title: String,
    /// Watermarked preview URL.
    pub preview_url: String,
    /// Price in minor units.
    pub price_cents: i64,
    /// Storage ID of the original file.
    pub original_public_id: String,
    /// Format of the original file.
    pub original_format: String,
    /// Publication flag.
    pub published: bool,
}

impl From<PhotoRow> for Photo {
    fn from(row: PhotoRow) -> Self {
        Self {
            id: row.id,
            slug: row.slug,
            title: row.title,
            preview_url: row.preview_url,
            price_cents: row.price_cents,
            original_public_id: row.original_public_id,
            original_format: row.original_format,
            published: row.published,
        }
    }
}

/// A row from the `download_tokens` table.
#[derive(Debug, Clone, FromRow)]
pub struct DownloadTokenRow {
    /// Primary key.
    pub id: uuid::Uuid,
    /// Token string (unique).
    pub token: String,
    /// Order foreign key.
    pub order_id: uuid::Uuid,
    /// Expiry.
    pub expires_at: DateTime<Utc>,
    /// Uses left.
    pub remaining_downloads: i32,
    /// Last redemption.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Mint time.
    pub created_at: DateTime<Utc>,
}

impl From<DownloadTokenRow> for DownloadToken {
    fn from(row: DownloadTokenRow) -> Self {
        Self {
            id: row.id,
            token: row.token,
            order_id: OrderId::from_uuid(row.order_id),
            expires_at: row.expires_at,
            remaining_downloads: row.remaining_downloads,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
        }
    }
}
