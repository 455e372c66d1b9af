//! Webhook acknowledgement DTO.

use serde::Serialize;
use utoipa::ToSchema;

/// Response body for `POST /api/pix/webhook/openpix`.
#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    /// Always `true`: the batch was accepted.
    pub ok: bool,
    /// Events whose unit of work committed, duplicates and orphans included.
    pub processed: usize,
}
