//! Persistence layer: orders, customers, the webhook ledger and download
//! tokens.
//!
//! All writes happen inside a [`UnitOfWork`] obtained from a [`Store`]. A
//! unit of work is committed explicitly; dropping it without calling
//! [`UnitOfWork::commit`] rolls everything back. Two implementations exist:
//! [`postgres::PostgresStore`] on top of `sqlx::PgPool` and
//! [`memory::MemoryStore`] for development and tests.

pub mod memory;
pub mod models;
pub mod postgres;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Customer, DownloadToken, NewCustomer, Order, OrderId, Photo, WebhookEventRecord,
};
use crate::error::ShopError;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Entry point to the storage backend.
#[async_trait]
pub trait Store: fmt::Debug + Send + Sync {
    /// Opens a new atomic unit of work.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::Persistence`] if the backend cannot start a
    /// transaction.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, ShopError>;
}

/// Operations available inside one atomic unit of work.
///
/// Every method returns [`ShopError::Persistence`] on backend failure.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Looks up a published photo.
    async fn find_published_photo(&mut self, photo_id: uuid::Uuid)
    -> Result<Option<Photo>, ShopError>;

    /// Looks up a photo regardless of its published flag.
    async fn find_photo(&mut self, photo_id: uuid::Uuid) -> Result<Option<Photo>, ShopError>;

    /// Inserts or updates a customer keyed by email; latest name and
    /// contact win.
    async fn upsert_customer(
        &mut self,
        customer: &NewCustomer,
        now: DateTime<Utc>,
    ) -> Result<Customer, ShopError>;

    /// Looks up a customer by ID.
    async fn find_customer(&mut self, customer_id: uuid::Uuid)
    -> Result<Option<Customer>, ShopError>;

    /// Inserts a new order.
    async fn insert_order(&mut self, order: &Order) -> Result<(), ShopError>;

    /// Loads an order and locks it against concurrent units of work until
    /// this one ends.
    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>, ShopError>;

    /// Loads and locks the order whose provider correlation ID matches, or
    /// failing that whose provider charge ID matches.
    async fn lock_order_by_provider_ref(
        &mut self,
        correlation_id: Option<&str>,
        charge_id: Option<&str>,
    ) -> Result<Option<Order>, ShopError>;

    /// Persists the mutable fields of an order (status, provider fields,
    /// timestamps).
    async fn update_order(&mut self, order: &Order) -> Result<(), ShopError>;

    /// Records a webhook event in the idempotency ledger.
    ///
    /// Returns `false` when a row with the same provider event ID already
    /// exists; that is not an error.
    async fn insert_webhook_event(&mut self, event: &WebhookEventRecord)
    -> Result<bool, ShopError>;

    /// Returns the newest token of the order that is unexpired and has uses
    /// left.
    async fn find_active_token(
        &mut self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadToken>, ShopError>;

    /// Inserts a freshly minted token.
    async fn insert_token(&mut self, token: &DownloadToken) -> Result<(), ShopError>;

    /// Looks up a token by its string.
    async fn find_token(&mut self, token: &str) -> Result<Option<DownloadToken>, ShopError>;

    /// Decrements the token's remaining uses and stamps `last_used_at`, but
    /// only if it is still unexpired and has uses left at that instant.
    ///
    /// Returns the updated token, or `None` when the guard did not hold.
    async fn consume_token(
        &mut self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadToken>, ShopError>;

    /// Makes every change of this unit of work durable.
    async fn commit(self: Box<Self>) -> Result<(), ShopError>;
}
