//! Idempotency ledger entries for provider webhook events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OrderId;

/// One externally observed payment event, recorded exactly once per
/// provider event identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEventRecord {
    /// Provider-assigned (or derived) event identifier. Unique.
    pub provider_event_id: String,
    /// Order the event resolved to, if any.
    pub order_id: Option<OrderId>,
    /// Provider that sent the event.
    pub provider: String,
    /// Event type label.
    pub event_type: String,
    /// Raw event body.
    pub payload: serde_json::Value,
    /// When the event was first seen.
    pub received_at: DateTime<Utc>,
}
