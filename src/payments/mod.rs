//! Payment provider adapters.
//!
//! A [`PaymentProvider`] turns an order into a provider charge and turns
//! provider webhook payloads into [`NormalizedEvent`]s. Adapters never touch
//! persistence; the service layer decides what to do with their output.

pub mod openpix;
pub mod unsupported;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{OrderId, OrderStatus};

pub use openpix::{OpenPixConfig, OpenPixProvider};
pub use unsupported::UnsupportedProvider;

/// Failures raised by a payment provider adapter.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Provider credentials are missing.
    #[error("payment provider not configured: {0}")]
    Configuration(String),

    /// The selected provider has no adapter yet.
    #[error("payment provider not supported: {0}")]
    Unsupported(String),

    /// Provider answered with a non-2xx status.
    #[error("payment provider returned HTTP {status}")]
    Http {
        /// Numeric HTTP status.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Network-level failure talking to the provider.
    #[error("payment provider transport error: {0}")]
    Transport(String),

    /// A 2xx response whose body does not match the expected schema.
    #[error("payment provider response not understood: {0}")]
    Decode(String),
}

impl ProviderError {
    /// JSON kept as the order's provider payload when charge creation fails.
    ///
    /// HTTP failures keep the status and the response body, parsed as JSON
    /// when possible and verbatim otherwise.
    #[must_use]
    pub fn audit_record(&self) -> serde_json::Value {
        match self {
            Self::Http { status, body } => {
                let body = serde_json::from_str(body)
                    .unwrap_or_else(|_| serde_json::Value::String(body.clone()));
                serde_json::json!({ "error": self.to_string(), "status": status, "body": body })
            }
            _ => serde_json::json!({ "error": self.to_string() }),
        }
    }
}

/// Charge status reduced to the three outcomes the order lifecycle cares
/// about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChargeStatus {
    /// Awaiting payment.
    Pending,
    /// Payment completed.
    Paid,
    /// Charge canceled.
    Canceled,
}

impl ChargeStatus {
    /// Maps a provider status string.
    ///
    /// Matching is a case-insensitive substring test so that vocabulary
    /// drift (`COMPLETED`, `CHARGE_COMPLETED`, `PAID`, `CANCELED`,
    /// `CANCELLED`, ...) keeps reducing to the same three outcomes.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        let normalized = status.to_uppercase();
        if normalized.contains("COMPLETED") || normalized.contains("PAID") {
            Self::Paid
        } else if normalized.contains("CANCEL") {
            Self::Canceled
        } else {
            Self::Pending
        }
    }
}

impl From<ChargeStatus> for OrderStatus {
    fn from(status: ChargeStatus) -> Self {
        match status {
            ChargeStatus::Pending => Self::Pending,
            ChargeStatus::Paid => Self::Paid,
            ChargeStatus::Canceled => Self::Canceled,
        }
    }
}

/// Everything a provider needs to create a charge for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    /// Order being charged; used as the correlation identifier.
    pub order_id: OrderId,
    /// Amount in minor currency units.
    pub amount_cents: i64,
    /// Payer name.
    pub customer_name: String,
    /// Payer email.
    pub customer_email: String,
    /// Optional payer phone / WhatsApp.
    pub customer_contact: Option<String>,
    /// Free-text description shown to the payer.
    pub description: String,
    /// Charge validity window.
    pub expires_in_seconds: u64,
}

/// A charge created by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ChargeResult {
    /// Provider name (e.g. `"openpix"`).
    pub provider: String,
    /// Provider charge identifier.
    pub charge_id: String,
    /// Provider correlation identifier.
    pub correlation_id: String,
    /// Reduced charge status.
    pub status: ChargeStatus,
    /// Copy-paste payment code, passed through opaquely.
    pub br_code: String,
    /// QR code image reference, passed through opaquely.
    pub qr_code_image: String,
    /// Optional hosted payment page.
    pub payment_link_url: Option<String>,
    /// Optional charge expiry.
    pub expires_at: Option<DateTime<Utc>>,
    /// Verbatim provider response.
    pub raw: serde_json::Value,
}

/// A provider webhook event reduced to what the ingestion service needs.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEvent {
    /// Provider event identifier, or a deterministic fallback.
    pub provider_event_id: String,
    /// Charge identifier used for order lookup.
    pub charge_id: Option<String>,
    /// Correlation identifier used for order lookup (checked first).
    pub correlation_id: Option<String>,
    /// Event type label.
    pub event_type: String,
    /// Whether the event reports a completed payment.
    pub paid: bool,
    /// Whether the event reports a cancellation.
    pub canceled: bool,
    /// Raw event body.
    pub raw: serde_json::Value,
}

/// A charge-generating payment provider.
#[async_trait]
pub trait PaymentProvider: fmt::Debug + Send + Sync {
    /// Short provider name stored on orders and ledger rows.
    fn name(&self) -> &'static str;

    /// Creates a charge for an order.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Configuration`] when credentials are
    /// missing, [`ProviderError::Http`] on a non-2xx answer and
    /// [`ProviderError::Transport`] when the provider cannot be reached.
    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeResult, ProviderError>;

    /// Normalizes a webhook payload. Never fails: payloads that cannot be
    /// interpreted yield an empty vector.
    fn parse_webhook(&self, payload: &serde_json::Value) -> Vec<NormalizedEvent>;
}

/// Supported provider selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenPix Pix charges.
    OpenPix,
    /// Mercado Pago (no adapter yet).
    MercadoPago,
    /// Efí (no adapter yet).
    Efi,
}

impl ProviderKind {
    /// Configuration label for this provider.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OpenPix => "openpix",
            Self::MercadoPago => "mercadopago",
            Self::Efi => "efi",
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openpix" => Ok(Self::OpenPix),
            "mercadopago" => Ok(Self::MercadoPago),
            "efi" => Ok(Self::Efi),
            other => Err(format!("unknown payment provider: {other}")),
        }
    }
}

/// Builds the adapter for the configured provider.
///
/// # Errors
///
/// Returns [`ProviderError::Transport`] if the HTTP client cannot be built.
pub fn build_provider(
    kind: ProviderKind,
    openpix: OpenPixConfig,
) -> Result<Arc<dyn PaymentProvider>, ProviderError> {
    Ok(match kind {
        ProviderKind::OpenPix => Arc::new(OpenPixProvider::new(openpix)?),
        ProviderKind::MercadoPago => Arc::new(UnsupportedProvider::new("mercadopago")),
        ProviderKind::Efi => Arc::new(UnsupportedProvider::new("efi")),
    })
}
