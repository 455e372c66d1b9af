//! Webhook ingestion: provider payload → ledger row → order transition.
//!
//! Every normalized event runs in its own unit of work:
//!
//! 1. Resolve and lock the order (correlation ID, then charge ID, then the
//!    correlation ID read as an order ID).
//! 2. Insert the ledger row. A duplicate commits nothing new and stops.
//! 3. Without an order the ledger row is committed as an orphan.
//! 4. Otherwise apply `paid` / `canceled`, issue the download token on
//!    `PENDING → PAID`, and commit.
//!
//! The notification described by the [`EventOutcome`] is dispatched only
//! after the commit. A failing event is logged and does not affect the rest
//! of the batch.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::{TokenIssuer, download_ready_message};
use crate::domain::{Order, OrderId, OrderStatus, Transition, WebhookEventRecord};
use crate::error::ShopError;
use crate::notify::{DownloadReady, NotificationDispatcher};
use crate::payments::{NormalizedEvent, PaymentProvider};
use crate::persistence::{Store, UnitOfWork};

/// What one committed event did.
#[derive(Debug, Clone, PartialEq)]
pub enum EventOutcome {
    /// The provider event ID was already in the ledger.
    Duplicate,
    /// No order matches the event; the ledger row was kept.
    Orphan,
    /// The order changed state.
    Applied {
        /// Affected order.
        order_id: OrderId,
        /// New status.
        status: OrderStatus,
        /// Message to dispatch after commit, for `PENDING → PAID`.
        notification: Option<DownloadReady>,
    },
    /// The order was found but the event did not change it.
    Ignored {
        /// Affected order.
        order_id: OrderId,
        /// Status the order stays in.
        status: OrderStatus,
    },
}

/// Applies provider webhook events to orders.
#[derive(Debug, Clone)]
pub struct IngestionService {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    issuer: TokenIssuer,
    notifier: NotificationDispatcher,
    app_url: String,
}

impl IngestionService {
    /// Creates a new `IngestionService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
        issuer: TokenIssuer,
        notifier: NotificationDispatcher,
        app_url: String,
    ) -> Self {
        Self {
            store,
            provider,
            issuer,
            notifier,
            app_url,
        }
    }

    /// Normalizes a webhook payload and processes each event in order.
    ///
    /// Returns the number of events whose unit of work committed,
    /// duplicates and orphans included.
    pub async fn process_payload(&self, payload: &serde_json::Value) -> usize {
        let events = self.provider.parse_webhook(payload);
        if events.is_empty() {
            tracing::info!(provider = self.provider.name(), "webhook carried no usable events");
        }

        let mut processed = 0;
        for event in &events {
            match self.process_event(event).await {
                Ok(outcome) => {
                    processed += 1;
                    if let EventOutcome::Applied {
                        notification: Some(message),
                        ..
                    } = &outcome
                    {
                        self.notifier.dispatch(message).await;
                    }
                }
                Err(e) => {
                    tracing::error!(
                        event_id = %event.provider_event_id,
                        error = %e,
                        "webhook event processing failed"
                    );
                }
            }
        }
        processed
    }

    /// Processes one event inside its own unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::Persistence`] if any storage step fails; the unit
    /// of work is then rolled back.
    pub async fn process_event(&self, event: &NormalizedEvent) -> Result<EventOutcome, ShopError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;

        let order = resolve_order(uow.as_mut(), event).await?;
        let record = WebhookEventRecord {
            provider_event_id: event.provider_event_id.clone(),
            order_id: order.as_ref().map(|o| o.id),
            provider: self.provider.name().to_string(),
            event_type: event.event_type.clone(),
            payload: event.raw.clone(),
            received_at: now,
        };

        if !uow.insert_webhook_event(&record).await? {
            uow.commit().await?;
            tracing::info!(event_id = %event.provider_event_id, "duplicate webhook event ignored");
            return Ok(EventOutcome::Duplicate);
        }

        let Some(mut order) = order else {
            uow.commit().await?;
            tracing::warn!(
                event_id = %event.provider_event_id,
                correlation_id = ?event.correlation_id,
                charge_id = ?event.charge_id,
                "webhook event matches no order"
            );
            return Ok(EventOutcome::Orphan);
        };

        let outcome = self.apply(uow.as_mut(), &mut order, event, now).await?;
        uow.commit().await?;
        Ok(outcome)
    }

    async fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        order: &mut Order,
        event: &NormalizedEvent,
        now: DateTime<Utc>,
    ) -> Result<EventOutcome, ShopError> {
        let transition = if event.paid {
            order.mark_paid(now, Some(event.raw.clone()))
        } else if event.canceled {
            order.cancel(now, Some(event.raw.clone()))
        } else {
            Transition::Unchanged
        };

        match transition {
            Transition::Applied => {
                uow.update_order(order).await?;
                let notification = if order.status == OrderStatus::Paid {
                    let token = self.issuer.ensure(uow, order.id, now).await?;
                    download_ready_message(uow, order, &token, &self.app_url).await?
                } else {
                    None
                };
                tracing::info!(
                    order_id = %order.id,
                    event_id = %event.provider_event_id,
                    status = %order.status,
                    "order updated from webhook"
                );
                Ok(EventOutcome::Applied {
                    order_id: order.id,
                    status: order.status,
                    notification,
                })
            }
            Transition::Unchanged => Ok(EventOutcome::Ignored {
                order_id: order.id,
                status: order.status,
            }),
            Transition::Rejected { from } => {
                tracing::warn!(
                    order_id = %order.id,
                    event_id = %event.provider_event_id,
                    status = %from,
                    paid = event.paid,
                    canceled = event.canceled,
                    "webhook event conflicts with terminal order state"
                );
                Ok(EventOutcome::Ignored {
                    order_id: order.id,
                    status: from,
                })
            }
        }
    }
}

async fn resolve_order(
    uow: &mut dyn UnitOfWork,
    event: &NormalizedEvent,
) -> Result<Option<Order>, ShopError> {
    let correlation_id = event.correlation_id.as_deref();
    if let Some(order) = uow
        .lock_order_by_provider_ref(correlation_id, event.charge_id.as_deref())
        .await?
    {
        return Ok(Some(order));
    }

    // The correlation ID is the order ID; this also covers an event racing
    // ahead of the charge identifiers being stored.
    match correlation_id.and_then(|c| c.parse::<OrderId>().ok()) {
        Some(order_id) => uow.lock_order(order_id).await,
        None => Ok(None),
    }
}
