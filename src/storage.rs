//! Signed, short-lived URLs for original (unwatermarked) files.
//!
//! The file store itself is external; this module only mints the URL a
//! successful token redemption redirects to.

use std::fmt;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::domain::Photo;
use crate::error::ShopError;

type HmacSha256 = Hmac<Sha256>;

/// Mints time-limited URLs for original files.
pub trait OriginUrlSigner: fmt::Debug + Send + Sync {
    /// Returns a URL granting access to `photo`'s original until
    /// `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::Configuration`] when signing credentials are
    /// missing.
    fn signed_original_url(
        &self,
        photo: &Photo,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ShopError>;
}

/// Signs `{base}/{public_id}.{format}?expires=<unix>&signature=<hex>` with
/// HMAC-SHA256 over `"{public_id}.{format}:{expires}"`.
#[derive(Clone)]
pub struct HmacUrlSigner {
    base_url: String,
    secret: Option<String>,
}

impl fmt::Debug for HmacUrlSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HmacUrlSigner")
            .field("base_url", &self.base_url)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HmacUrlSigner {
    /// Creates a signer for the given storage origin.
    #[must_use]
    pub fn new(base_url: &str, secret: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// Computes the hex signature for a resource path and expiry.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::Configuration`] when no secret is configured.
    pub fn signature(&self, path: &str, expires: i64) -> Result<String, ShopError> {
        let Some(secret) = self.secret.as_deref() else {
            return Err(ShopError::Configuration(
                "STORAGE_SIGNING_SECRET is not set".to_string(),
            ));
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ShopError::Internal(e.to_string()))?;
        mac.update(format!("{path}:{expires}").as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

impl OriginUrlSigner for HmacUrlSigner {
    fn signed_original_url(
        &self,
        photo: &Photo,
        expires_at: DateTime<Utc>,
    ) -> Result<String, ShopError> {
        let path = format!("{}.{}", photo.original_public_id, photo.original_format);
        let expires = expires_at.timestamp();
        let signature = self.signature(&path, expires)?;
        Ok(format!(
            "{}/{path}?expires={expires}&signature={signature}",
            self.base_url
        ))
    }
}
