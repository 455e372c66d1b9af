//! In-memory implementation of the persistence layer.
//!
//! Used when `PERSISTENCE_ENABLED=false` and by the test suite. A unit of
//! work holds the store's single async mutex for its whole lifetime and
//! operates on a working copy of the state; [`UnitOfWork::commit`] writes the
//! copy back, dropping it discards it. Units of work are therefore fully
//! serialized, which trivially satisfies every atomicity requirement the
//! PostgreSQL backend meets with row locks and conditional updates.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{Store, UnitOfWork};
use crate::domain::{
    Customer, DownloadToken, NewCustomer, Order, OrderId, Photo, WebhookEventRecord,
};
use crate::error::ShopError;

#[derive(Debug, Clone, Default)]
struct MemoryState {
    photos: HashMap<uuid::Uuid, Photo>,
    customers: HashMap<uuid::Uuid, Customer>,
    orders: HashMap<OrderId, Order>,
    webhook_events: HashMap<String, WebhookEventRecord>,
    tokens: Vec<DownloadToken>,
}

/// Process-local store backed by a `tokio` mutex.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a photo.
    pub async fn insert_photo(&self, photo: Photo) {
        self.state.lock().await.photos.insert(photo.id, photo);
    }

    /// Returns a committed order.
    pub async fn order(&self, order_id: OrderId) -> Option<Order> {
        self.state.lock().await.orders.get(&order_id).cloned()
    }

    /// Returns every committed order, oldest first.
    pub async fn orders(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.state.lock().await.orders.values().cloned().collect();
        orders.sort_by_key(|o| o.created_at);
        orders
    }

    /// Returns every token minted for an order, oldest first.
    pub async fn tokens_for(&self, order_id: OrderId) -> Vec<DownloadToken> {
        self.state
            .lock()
            .await
            .tokens
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Returns every ledger entry.
    pub async fn webhook_events(&self) -> Vec<WebhookEventRecord> {
        self.state
            .lock()
            .await
            .webhook_events
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, ShopError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnitOfWork { guard, working }))
    }
}

struct MemoryUnitOfWork {
    guard: OwnedMutexGuard<MemoryState>,
    working: MemoryState,
}

impl MemoryUnitOfWork {
    fn newest_order_where(&self, pred: impl Fn(&Order) -> bool) -> Option<Order> {
        self.working
            .orders
            .values()
            .filter(|o| pred(o))
            .max_by_key(|o| o.created_at)
            .cloned()
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn find_published_photo(
        &mut self,
        photo_id: uuid::Uuid,
    ) -> Result<Option<Photo>, ShopError> {
        Ok(self
            .working
            .photos
            .get(&photo_id)
            .filter(|p| p.published)
            .cloned())
    }

    async fn find_photo(&mut self, photo_id: uuid::Uuid) -> Result<Option<Photo>, ShopError> {
        Ok(self.working.photos.get(&photo_id).cloned())
    }

    async fn upsert_customer(
        &mut self,
        customer: &NewCustomer,
        now: DateTime<Utc>,
    ) -> Result<Customer, ShopError> {
        if let Some(existing) = self
            .working
            .customers
            .values_mut()
            .find(|c| c.email == customer.email)
        {
            existing.name.clone_from(&customer.name);
            existing.whatsapp.clone_from(&customer.whatsapp);
            return Ok(existing.clone());
        }

        let created = Customer {
            id: uuid::Uuid::new_v4(),
            name: customer.name.clone(),
            email: customer.email.clone(),
            whatsapp: customer.whatsapp.clone(),
            created_at: now,
        };
        self.working.customers.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_customer(
        &mut self,
        customer_id: uuid::Uuid,
    ) -> Result<Option<Customer>, ShopError> {
        Ok(self.working.customers.get(&customer_id).cloned())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), ShopError> {
        if self.working.orders.contains_key(&order.id) {
            return Err(ShopError::Persistence(format!(
                "order {} already exists",
                order.id
            )));
        }
        self.working.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>, ShopError> {
        Ok(self.working.orders.get(&order_id).cloned())
    }

    async fn lock_order_by_provider_ref(
        &mut self,
        correlation_id: Option<&str>,
        charge_id: Option<&str>,
    ) -> Result<Option<Order>, ShopError> {
        if let Some(correlation_id) = correlation_id
            && let Some(order) = self.newest_order_where(|o| {
                o.provider_correlation_id.as_deref() == Some(correlation_id)
            })
        {
            return Ok(Some(order));
        }
        if let Some(charge_id) = charge_id {
            return Ok(self.newest_order_where(|o| o.provider_charge_id.as_deref() == Some(charge_id)));
        }
        Ok(None)
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), ShopError> {
        match self.working.orders.get_mut(&order.id) {
            Some(stored) => {
                *stored = order.clone();
                Ok(())
            }
            None => Err(ShopError::OrderNotFound(*order.id.as_uuid())),
        }
    }

    async fn insert_webhook_event(
        &mut self,
        event: &WebhookEventRecord,
    ) -> Result<bool, ShopError> {
        if self
            .working
            .webhook_events
            .contains_key(&event.provider_event_id)
        {
            return Ok(false);
        }
        self.working
            .webhook_events
            .insert(event.provider_event_id.clone(), event.clone());
        Ok(true)
    }

    async fn find_active_token(
        &mut self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadToken>, ShopError> {
        Ok(self
            .working
            .tokens
            .iter()
            .filter(|t| t.order_id == order_id && t.is_active(now))
            .max_by_key(|t| t.created_at)
            .cloned())
    }

    async fn insert_token(&mut self, token: &DownloadToken) -> Result<(), ShopError> {
        if self.working.tokens.iter().any(|t| t.token == token.token) {
            return Err(ShopError::Persistence("duplicate download token".to_string()));
        }
        self.working.tokens.push(token.clone());
        Ok(())
    }

    async fn find_token(&mut self, token: &str) -> Result<Option<DownloadToken>, ShopError> {
        Ok(self
            .working
            .tokens
            .iter()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn consume_token(
        &mut self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadToken>, ShopError> {
        let Some(stored) = self
            .working
            .tokens
            .iter_mut()
            .find(|t| t.token == token && t.is_active(now))
        else {
            return Ok(None);
        };
        stored.remaining_downloads -= 1;
        stored.last_used_at = Some(now);
        Ok(Some(stored.clone()))
    }

    async fn commit(self: Box<Self>) -> Result<(), ShopError> {
        let Self { mut guard, working } = *self;
        *guard = working;
        Ok(())
    }
}
