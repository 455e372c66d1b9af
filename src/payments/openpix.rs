//! OpenPix adapter: Pix charge creation and webhook normalization.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{
    ChargeRequest, ChargeResult, ChargeStatus, NormalizedEvent, PaymentProvider, ProviderError,
};

const PROVIDER_NAME: &str = "openpix";
const DEFAULT_EVENT_TYPE: &str = "OPENPIX_EVENT";

/// Connection settings for the OpenPix API.
#[derive(Debug, Clone)]
pub struct OpenPixConfig {
    /// Application ID sent as the `Authorization` header. `None` disables
    /// charge creation.
    pub app_id: Option<String>,
    /// API base URL (e.g. `https://api.openpix.com.br`).
    pub base_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

/// OpenPix implementation of [`PaymentProvider`].
#[derive(Debug, Clone)]
pub struct OpenPixProvider {
    client: reqwest::Client,
    app_id: Option<String>,
    base_url: String,
}

impl OpenPixProvider {
    /// Creates the adapter and its HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Transport`] if the HTTP client cannot be
    /// initialised.
    pub fn new(config: OpenPixConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            app_id: config.app_id.filter(|id| !id.trim().is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PaymentProvider for OpenPixProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeResult, ProviderError> {
        let Some(app_id) = self.app_id.as_deref() else {
            return Err(ProviderError::Configuration(
                "OPENPIX_APP_ID is not set".to_string(),
            ));
        };

        let response = self
            .client
            .post(format!("{}/api/v1/charge", self.base_url))
            .header(AUTHORIZATION, app_id)
            .json(&ChargeBody::from(request))
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        parse_charge_response(status, &text)
    }

    fn parse_webhook(&self, payload: &serde_json::Value) -> Vec<NormalizedEvent> {
        parse_webhook_payload(payload)
    }
}

// ---------------------------------------------------------------------------
// Charge creation
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChargeBody {
    #[serde(rename = "correlationID")]
    correlation_id: String,
    value: i64,
    comment: String,
    customer: ChargeCustomer,
    #[serde(rename = "expiresIn")]
    expires_in: u64,
}

#[derive(Debug, Serialize)]
struct ChargeCustomer {
    name: String,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
}

impl From<&ChargeRequest> for ChargeBody {
    fn from(request: &ChargeRequest) -> Self {
        Self {
            correlation_id: request.order_id.to_string(),
            value: request.amount_cents,
            comment: request.description.clone(),
            customer: ChargeCustomer {
                name: request.customer_name.clone(),
                email: request.customer_email.clone(),
                phone: request.customer_contact.as_deref().and_then(normalize_phone),
            },
            expires_in: request.expires_in_seconds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChargeEnvelope {
    charge: ChargeFields,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeFields {
    #[serde(rename = "correlationID")]
    correlation_id: String,
    identifier: Option<String>,
    txid: Option<String>,
    status: String,
    br_code: String,
    qr_code_image: String,
    payment_link_url: Option<String>,
    expires_date: Option<String>,
}

/// Normalizes a Brazilian phone number to E.164.
///
/// 10 or 11 digits are treated as a national number and get `+55`; 12 or 13
/// digits already carry a country code. Anything else is dropped.
fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    match digits.len() {
        10 | 11 => Some(format!("+55{digits}")),
        12 | 13 => Some(format!("+{digits}")),
        _ => None,
    }
}

/// Interprets an OpenPix charge response.
///
/// Non-JSON bodies are kept as `{"rawText": ...}` so that the verbatim
/// answer still reaches the order's audit field.
fn parse_charge_response(status: u16, text: &str) -> Result<ChargeResult, ProviderError> {
    let raw: serde_json::Value = if text.is_empty() {
        serde_json::json!({})
    } else {
        serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "rawText": text }))
    };

    if !(200..300).contains(&status) {
        return Err(ProviderError::Http {
            status,
            body: raw.to_string(),
        });
    }

    let envelope: ChargeEnvelope =
        serde_json::from_value(raw.clone()).map_err(|e| ProviderError::Decode(e.to_string()))?;
    let charge = envelope.charge;

    let charge_id = charge
        .identifier
        .clone()
        .or_else(|| charge.txid.clone())
        .unwrap_or_else(|| charge.correlation_id.clone());
    let expires_at = charge
        .expires_date
        .as_deref()
        .and_then(|d| DateTime::parse_from_rfc3339(d).ok())
        .map(|d| d.with_timezone(&Utc));

    Ok(ChargeResult {
        provider: PROVIDER_NAME.to_string(),
        charge_id,
        correlation_id: charge.correlation_id,
        status: ChargeStatus::from_provider(&charge.status),
        br_code: charge.br_code,
        qr_code_image: charge.qr_code_image,
        payment_link_url: charge.payment_link_url,
        expires_at,
        raw,
    })
}

// ---------------------------------------------------------------------------
// Webhooks
// ---------------------------------------------------------------------------

/// Top-level webhook shapes: a batch under `events`, a batch under
/// `charges`, or a single event object. Anything else is rejected.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WebhookEnvelope {
    Events { events: Vec<serde_json::Value> },
    Charges { charges: Vec<serde_json::Value> },
    Single(serde_json::Map<String, serde_json::Value>),
}

impl WebhookEnvelope {
    fn into_candidates(self) -> Vec<serde_json::Value> {
        match self {
            Self::Events { events } => events,
            Self::Charges { charges } => charges,
            Self::Single(map) => vec![serde_json::Value::Object(map)],
        }
    }
}

/// Identifier-like field: providers send these as strings or numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
}

impl Scalar {
    fn label(&self) -> Option<String> {
        match self {
            Self::Text(s) if s.trim().is_empty() => None,
            Self::Text(s) => Some(s.clone()),
            Self::Number(n) => Some(n.to_string()),
        }
    }
}

fn label(field: Option<&Scalar>) -> Option<String> {
    field.and_then(Scalar::label)
}

#[derive(Debug, Default, Deserialize)]
struct ChargeRef {
    status: Option<Scalar>,
    #[serde(rename = "correlationID")]
    correlation_id: Option<Scalar>,
    #[serde(rename = "correlationId")]
    correlation_id_alt: Option<Scalar>,
    identifier: Option<Scalar>,
    txid: Option<Scalar>,
    #[serde(rename = "transactionID")]
    transaction_id: Option<Scalar>,
}

#[derive(Debug, Default, Deserialize)]
struct PixTransactionRef {
    #[serde(rename = "endToEndId")]
    end_to_end_id: Option<Scalar>,
}

/// One webhook event. When `charge` is absent the charge fields are read
/// from the event object itself.
#[derive(Debug, Deserialize)]
struct EventBody {
    event: Option<Scalar>,
    #[serde(rename = "eventType")]
    event_type: Option<Scalar>,
    #[serde(rename = "eventId")]
    event_id: Option<Scalar>,
    id: Option<Scalar>,
    #[serde(rename = "chargeId")]
    charge_id: Option<Scalar>,
    charge: Option<ChargeRef>,
    #[serde(rename = "pixTransaction")]
    pix_transaction: Option<PixTransactionRef>,
    #[serde(flatten)]
    inline: ChargeRef,
}

fn parse_webhook_payload(payload: &serde_json::Value) -> Vec<NormalizedEvent> {
    let envelope = match WebhookEnvelope::deserialize(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(error = %e, "unrecognized openpix webhook payload");
            return Vec::new();
        }
    };

    envelope
        .into_candidates()
        .into_iter()
        .filter_map(|candidate| match EventBody::deserialize(&candidate) {
            Ok(body) => Some(normalize_event(&body, candidate)),
            Err(e) => {
                tracing::warn!(error = %e, "skipping malformed openpix webhook event");
                None
            }
        })
        .collect()
}

fn normalize_event(body: &EventBody, raw: serde_json::Value) -> NormalizedEvent {
    let charge = body.charge.as_ref().unwrap_or(&body.inline);

    let status = label(charge.status.as_ref())
        .or_else(|| label(body.inline.status.as_ref()))
        .unwrap_or_default();
    let event_type = label(body.event.as_ref())
        .or_else(|| label(body.event_type.as_ref()))
        .or_else(|| label(charge.status.as_ref()))
        .unwrap_or_else(|| DEFAULT_EVENT_TYPE.to_string());

    let correlation_id = label(charge.correlation_id.as_ref())
        .or_else(|| label(charge.correlation_id_alt.as_ref()))
        .or_else(|| label(body.inline.correlation_id.as_ref()));
    let charge_id = label(charge.identifier.as_ref())
        .or_else(|| label(charge.txid.as_ref()))
        .or_else(|| label(body.charge_id.as_ref()));

    let provider_event_id = label(body.event_id.as_ref())
        .or_else(|| label(body.id.as_ref()))
        .or_else(|| {
            body.pix_transaction
                .as_ref()
                .and_then(|p| label(p.end_to_end_id.as_ref()))
        })
        .or_else(|| label(charge.transaction_id.as_ref()))
        .or_else(|| label(charge.txid.as_ref()))
        .unwrap_or_else(|| {
            let anchor = correlation_id
                .clone()
                .or_else(|| charge_id.clone())
                .unwrap_or_else(|| hash_body(&raw));
            format!("{event_type}:{anchor}")
        });

    let reduced = ChargeStatus::from_provider(&status);

    NormalizedEvent {
        provider_event_id,
        charge_id,
        correlation_id,
        event_type,
        paid: reduced == ChargeStatus::Paid,
        canceled: reduced == ChargeStatus::Canceled,
        raw,
    }
}

/// SHA-256 over the canonical JSON encoding. Contains no delivery-time
/// input, so redeliveries of the same body hash identically.
fn hash_body(body: &serde_json::Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
