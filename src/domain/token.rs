//! Download tokens: capabilities granting access to an order's original file.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use super::OrderId;

/// Number of random bytes behind a token string (hex-encoded, 48 chars).
pub const TOKEN_BYTES: usize = 24;

/// A time- and count-limited download capability bound to one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadToken {
    /// Row identifier.
    pub id: uuid::Uuid,
    /// Unguessable token string handed to the customer.
    pub token: String,
    /// Order this token grants access for.
    pub order_id: OrderId,
    /// Instant after which the token is no longer usable.
    pub expires_at: DateTime<Utc>,
    /// Uses left. Never negative.
    pub remaining_downloads: i32,
    /// Last successful redemption.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Mint time. The newest active token wins when several exist.
    pub created_at: DateTime<Utc>,
}

impl DownloadToken {
    /// Returns `true` while the token is unexpired and has uses left.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now && self.remaining_downloads > 0
    }
}

/// Expiry horizon and use budget applied to newly minted tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Hours from mint time until expiry.
    pub expiry_hours: u32,
    /// Number of downloads granted.
    pub max_uses: u32,
}

impl TokenPolicy {
    /// Creates a policy; both values are clamped to at least 1.
    #[must_use]
    pub fn new(expiry_hours: u32, max_uses: u32) -> Self {
        Self {
            expiry_hours: expiry_hours.max(1),
            max_uses: max_uses.max(1),
        }
    }

    /// Mints a fresh token for `order_id`.
    #[must_use]
    pub fn mint(&self, order_id: OrderId, now: DateTime<Utc>) -> DownloadToken {
        DownloadToken {
            id: uuid::Uuid::new_v4(),
            token: generate_token(),
            order_id,
            expires_at: now + Duration::hours(i64::from(self.expiry_hours)),
            remaining_downloads: i32::try_from(self.max_uses).unwrap_or(i32::MAX),
            last_used_at: None,
            created_at: now,
        }
    }
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self::new(48, 5)
    }
}

/// Generates a random hex token from the operating system CSPRNG.
#[must_use]
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
