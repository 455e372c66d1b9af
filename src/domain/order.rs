//! Purchase orders and their lifecycle state machine.
//!
//! An [`Order`] starts `PENDING` and may move exactly once, to `PAID` or
//! `CANCELED`. `EXPIRED` is reserved for provider-declared expiry. Every
//! mutation goes through [`Order::mark_paid`] or [`Order::cancel`], which
//! report what happened as a [`Transition`] instead of failing, so that
//! callers decide whether a refused transition is an error (admin request)
//! or a silent no-op (late webhook).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::OrderId;

/// Lifecycle status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Charge created (or being created), payment not yet confirmed.
    Pending,
    /// Payment confirmed. Terminal.
    Paid,
    /// Charge canceled or failed. Terminal.
    Canceled,
    /// Provider-declared expiry. Terminal.
    Expired,
}

impl OrderStatus {
    /// Returns the canonical upper-case label stored in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Paid => "PAID",
            Self::Canceled => "CANCELED",
            Self::Expired => "EXPIRED",
        }
    }

    /// Returns `true` when no further transition is allowed.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PAID" => Ok(Self::Paid),
            "CANCELED" => Ok(Self::Canceled),
            "EXPIRED" => Ok(Self::Expired),
            other => Err(format!("unknown order status: {other}")),
        }
    }
}

/// Outcome of asking an order to change state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The order moved out of `PENDING`.
    Applied,
    /// The order was already in the requested state; nothing changed.
    Unchanged,
    /// The order is in a different terminal state; nothing changed.
    Rejected {
        /// Status the order was in when the transition was refused.
        from: OrderStatus,
    },
}

impl Transition {
    /// Returns `true` if the order was mutated.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// One purchase attempt for one photo by one customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier, also the provider correlation ID.
    pub id: OrderId,
    /// Photo being bought.
    pub photo_id: uuid::Uuid,
    /// Buyer.
    pub customer_id: uuid::Uuid,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Price in minor currency units, fixed at order time.
    pub amount_cents: i64,
    /// Name of the payment provider handling the charge.
    pub provider: String,
    /// Provider-side charge identifier, once a charge exists.
    pub provider_charge_id: Option<String>,
    /// Provider-side correlation identifier, once a charge exists.
    pub provider_correlation_id: Option<String>,
    /// Last provider payload seen for this order (last writer wins).
    pub provider_raw: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// When the order became `PAID`.
    pub paid_at: Option<DateTime<Utc>>,
    /// When the order became `CANCELED`.
    pub canceled_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Creates a new `PENDING` order.
    #[must_use]
    pub fn new_pending(
        photo_id: uuid::Uuid,
        customer_id: uuid::Uuid,
        amount_cents: i64,
        provider: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: OrderId::new(),
            photo_id,
            customer_id,
            status: OrderStatus::Pending,
            amount_cents,
            provider: provider.to_string(),
            provider_charge_id: None,
            provider_correlation_id: None,
            provider_raw: None,
            created_at: now,
            paid_at: None,
            canceled_at: None,
        }
    }

    /// Stores the identifiers of a freshly created provider charge.
    ///
    /// Overwrites earlier identifiers: a previous attempt that failed before
    /// a charge existed leaves nothing worth keeping.
    pub fn record_charge(
        &mut self,
        provider: &str,
        charge_id: &str,
        correlation_id: &str,
        raw: serde_json::Value,
    ) {
        provider.clone_into(&mut self.provider);
        self.provider_charge_id = Some(charge_id.to_string());
        self.provider_correlation_id = Some(correlation_id.to_string());
        self.provider_raw = Some(raw);
    }

    /// `PENDING → PAID`.
    ///
    /// Re-applying to a paid order is a no-op and keeps the original
    /// `paid_at`. `raw`, when given, replaces the stored provider payload.
    pub fn mark_paid(&mut self, now: DateTime<Utc>, raw: Option<serde_json::Value>) -> Transition {
        if let Some(settled) = self.settled_towards(OrderStatus::Paid) {
            return settled;
        }
        self.status = OrderStatus::Paid;
        self.paid_at = Some(now);
        if raw.is_some() {
            self.provider_raw = raw;
        }
        Transition::Applied
    }

    /// `PENDING → CANCELED`. Paid orders can never be canceled.
    pub fn cancel(&mut self, now: DateTime<Utc>, raw: Option<serde_json::Value>) -> Transition {
        if let Some(settled) = self.settled_towards(OrderStatus::Canceled) {
            return settled;
        }
        self.status = OrderStatus::Canceled;
        self.canceled_at = Some(now);
        if raw.is_some() {
            self.provider_raw = raw;
        }
        Transition::Applied
    }

    /// Outcome for an order already in a terminal state, `None` while it
    /// is still pending.
    fn settled_towards(&self, target: OrderStatus) -> Option<Transition> {
        if !self.status.is_terminal() {
            return None;
        }
        Some(if self.status == target {
            Transition::Unchanged
        } else {
            Transition::Rejected { from: self.status }
        })
    }
}
