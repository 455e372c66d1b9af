//! Customers and the photos they buy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A buyer, deduplicated by lower-cased email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Row identifier.
    pub id: uuid::Uuid,
    /// Display name (latest submission wins).
    pub name: String,
    /// Lower-cased email, unique.
    pub email: String,
    /// Optional WhatsApp contact (latest submission wins).
    pub whatsapp: Option<String>,
    /// First time this email bought something.
    pub created_at: DateTime<Utc>,
}

/// Customer data as submitted at checkout, already normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCustomer {
    /// Trimmed display name.
    pub name: String,
    /// Trimmed, lower-cased email.
    pub email: String,
    /// Contact handle; empty input becomes `None`.
    pub whatsapp: Option<String>,
}

impl NewCustomer {
    /// Normalizes raw checkout input.
    #[must_use]
    pub fn normalized(name: &str, email: &str, whatsapp: Option<&str>) -> Self {
        Self {
            name: name.trim().to_string(),
            email: email.trim().to_lowercase(),
            whatsapp: whatsapp
                .map(str::trim)
                .filter(|w| !w.is_empty())
                .map(ToString::to_string),
        }
    }
}

/// A sellable photo. Managed by the admin area; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Photo {
    /// Row identifier.
    pub id: uuid::Uuid,
    /// URL slug.
    pub slug: String,
    /// Display title.
    pub title: String,
    /// Public watermarked preview.
    pub preview_url: String,
    /// Price in minor currency units.
    pub price_cents: i64,
    /// Storage identifier of the unwatermarked original.
    pub original_public_id: String,
    /// File format of the original (e.g. `jpg`).
    pub original_format: String,
    /// Only published photos can be bought.
    pub published: bool,
}
