//! PostgreSQL implementation of the persistence layer.
//!
//! Each [`UnitOfWork`] wraps one `sqlx` transaction. Orders are locked with
//! `SELECT ... FOR UPDATE` before any transition or token issuance, the
//! webhook ledger relies on the unique `provider_event_id` constraint, and
//! token consumption is a single conditional `UPDATE`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};

use super::models::{CustomerRow, DownloadTokenRow, OrderRow, PhotoRow};
use super::{Store, UnitOfWork};
use crate::domain::{
    Customer, DownloadToken, NewCustomer, Order, OrderId, Photo, WebhookEventRecord,
};
use crate::error::ShopError;

macro_rules! order_columns {
    () => {
        "id, photo_id, customer_id, status, amount_cents, provider, provider_charge_id, \
         provider_correlation_id, provider_raw, created_at, paid_at, canceled_at"
    };
}

macro_rules! token_columns {
    () => {
        "id, token, order_id, expires_at, remaining_downloads, last_used_at, created_at"
    };
}

macro_rules! photo_columns {
    () => {
        "id, slug, title, preview_url, price_cents, original_public_id, original_format, published"
    };
}

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Maximum pool size.
    pub max_connections: u32,
    /// Minimum idle connections.
    pub min_connections: u32,
    /// Timeout for acquiring a connection.
    pub acquire_timeout: Duration,
}

/// PostgreSQL-backed store using `sqlx::PgPool`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a store on top of an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to the database and applies pending migrations.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::Persistence`] if the connection or a migration
    /// fails.
    pub async fn connect(settings: &PoolSettings) -> Result<Self, ShopError> {
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(settings.min_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(&settings.database_url)
            .await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| ShopError::Persistence(e.to_string()))?;

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, ShopError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }
}

/// A unit of work backed by one PostgreSQL transaction.
struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PostgresUnitOfWork {
    async fn find_published_photo(
        &mut self,
        photo_id: uuid::Uuid,
    ) -> Result<Option<Photo>, ShopError> {
        let row = sqlx::query_as::<_, PhotoRow>(concat!(
            "SELECT ",
            photo_columns!(),
            " FROM photos WHERE id = $1 AND published"
        ))
        .bind(photo_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Photo::from))
    }

    async fn find_photo(&mut self, photo_id: uuid::Uuid) -> Result<Option<Photo>, ShopError> {
        let row = sqlx::query_as::<_, PhotoRow>(concat!(
            "SELECT ",
            photo_columns!(),
            " FROM photos WHERE id = $1"
        ))
        .bind(photo_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Photo::from))
    }

    async fn upsert_customer(
        &mut self,
        customer: &NewCustomer,
        now: DateTime<Utc>,
    ) -> Result<Customer, ShopError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "INSERT INTO customers (id, name, email, whatsapp, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name, whatsapp = EXCLUDED.whatsapp \
             RETURNING id, name, email, whatsapp, created_at",
        )
        .bind(uuid::Uuid::new_v4())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.whatsapp)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.into())
    }

    async fn find_customer(
        &mut self,
        customer_id: uuid::Uuid,
    ) -> Result<Option<Customer>, ShopError> {
        let row = sqlx::query_as::<_, CustomerRow>(
            "SELECT id, name, email, whatsapp, created_at FROM customers WHERE id = $1",
        )
        .bind(customer_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(Customer::from))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), ShopError> {
        sqlx::query(concat!(
            "INSERT INTO orders (",
            order_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.photo_id)
        .bind(order.customer_id)
        .bind(order.status.as_str())
        .bind(order.amount_cents)
        .bind(&order.provider)
        .bind(&order.provider_charge_id)
        .bind(&order.provider_correlation_id)
        .bind(&order.provider_raw)
        .bind(order.created_at)
        .bind(order.paid_at)
        .bind(order.canceled_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>, ShopError> {
        let row = sqlx::query_as::<_, OrderRow>(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE id = $1 FOR UPDATE"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?;
        row.map(Order::try_from).transpose()
    }

    async fn lock_order_by_provider_ref(
        &mut self,
        correlation_id: Option<&str>,
        charge_id: Option<&str>,
    ) -> Result<Option<Order>, ShopError> {
        if let Some(correlation_id) = correlation_id {
            let row = sqlx::query_as::<_, OrderRow>(concat!(
                "SELECT ",
                order_columns!(),
                " FROM orders WHERE provider_correlation_id = $1 \
                 ORDER BY created_at DESC LIMIT 1 FOR UPDATE"
            ))
            .bind(correlation_id)
            .fetch_optional(&mut *self.tx)
            .await?;
            if let Some(row) = row {
                return Order::try_from(row).map(Some);
            }
        }

        if let Some(charge_id) = charge_id {
            let row = sqlx::query_as::<_, OrderRow>(concat!(
                "SELECT ",
                order_columns!(),
                " FROM orders WHERE provider_charge_id = $1 \
                 ORDER BY created_at DESC LIMIT 1 FOR UPDATE"
            ))
            .bind(charge_id)
            .fetch_optional(&mut *self.tx)
            .await?;
            if let Some(row) = row {
                return Order::try_from(row).map(Some);
            }
        }

        Ok(None)
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), ShopError> {
        sqlx::query(
            "UPDATE orders SET status = $2, provider = $3, provider_charge_id = $4, \
             provider_correlation_id = $5, provider_raw = $6, paid_at = $7, canceled_at = $8 \
             WHERE id = $1",
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(&order.provider)
        .bind(&order.provider_charge_id)
        .bind(&order.provider_correlation_id)
        .bind(&order.provider_raw)
        .bind(order.paid_at)
        .bind(order.canceled_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_webhook_event(
        &mut self,
        event: &WebhookEventRecord,
    ) -> Result<bool, ShopError> {
        let result = sqlx::query(
            "INSERT INTO payment_webhook_events \
             (provider_event_id, order_id, provider, event_type, payload, received_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (provider_event_id) DO NOTHING",
        )
        .bind(&event.provider_event_id)
        .bind(event.order_id.map(uuid::Uuid::from))
        .bind(&event.provider)
        .bind(&event.event_type)
        .bind(&event.payload)
        .bind(event.received_at)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() == 1),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn find_active_token(
        &mut self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadToken>, ShopError> {
        let row = sqlx::query_as::<_, DownloadTokenRow>(concat!(
            "SELECT ",
            token_columns!(),
            " FROM download_tokens \
             WHERE order_id = $1 AND expires_at > $2 AND remaining_downloads > 0 \
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(order_id.as_uuid())
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(DownloadToken::from))
    }

    async fn insert_token(&mut self, token: &DownloadToken) -> Result<(), ShopError> {
        sqlx::query(concat!(
            "INSERT INTO download_tokens (",
            token_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(token.id)
        .bind(&token.token)
        .bind(token.order_id.as_uuid())
        .bind(token.expires_at)
        .bind(token.remaining_downloads)
        .bind(token.last_used_at)
        .bind(token.created_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn find_token(&mut self, token: &str) -> Result<Option<DownloadToken>, ShopError> {
        let row = sqlx::query_as::<_, DownloadTokenRow>(concat!(
            "SELECT ",
            token_columns!(),
            " FROM download_tokens WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(DownloadToken::from))
    }

    async fn consume_token(
        &mut self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadToken>, ShopError> {
        let row = sqlx::query_as::<_, DownloadTokenRow>(concat!(
            "UPDATE download_tokens \
             SET remaining_downloads = remaining_downloads - 1, last_used_at = $2 \
             WHERE token = $1 AND expires_at > $2 AND remaining_downloads > 0 \
             RETURNING ",
            token_columns!()
        ))
        .bind(token)
        .bind(now)
        .fetch_optional(&mut *self.tx)
        .await?;
        Ok(row.map(DownloadToken::from))
    }

    async fn commit(self: Box<Self>) -> Result<(), ShopError> {
        self.tx.commit().await?;
        Ok(())
    }
}
