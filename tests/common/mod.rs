//! Test utilities and fixtures for the HTTP integration tests.

#![allow(dead_code, clippy::panic)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tower::ServiceExt;

pub use pix_checkout::api;
pub use pix_checkout::app_state::AppState;
pub use pix_checkout::domain::{
    Customer, DownloadToken, NewCustomer, Order, OrderId, OrderStatus, Photo, TokenPolicy,
    WebhookEventRecord,
};
pub use pix_checkout::error::ShopError;
pub use pix_checkout::notify::{DownloadReady, NotificationDispatcher, Notifier, NotifyError};
pub use pix_checkout::payments::{
    ChargeRequest, ChargeResult, ChargeStatus, NormalizedEvent, OpenPixConfig, OpenPixProvider,
    PaymentProvider, ProviderError,
};
pub use pix_checkout::persistence::{MemoryStore, Store, UnitOfWork};
pub use pix_checkout::service::{CheckoutSettings, IngestionService, OrderService, TokenIssuer};
pub use pix_checkout::storage::HmacUrlSigner;

pub const WEBHOOK_SECRET: &str = "whsec_integration";
pub const ADMIN_TOKEN: &str = "admin_integration";
pub const STORAGE_BASE: &str = "https://files.example";

// ============================================================================
// Fakes
// ============================================================================

/// Provider answering charges from a script; webhooks are parsed the
/// OpenPix way.
#[derive(Debug)]
pub struct FakeProvider {
    status: ChargeStatus,
    fail_with: Option<u16>,
    pub calls: AtomicUsize,
    parser: OpenPixProvider,
}

impl FakeProvider {
    pub fn answering(status: ChargeStatus) -> Self {
        Self::build(status, None)
    }

    pub fn failing(http_status: u16) -> Self {
        Self::build(ChargeStatus::Pending, Some(http_status))
    }

    fn build(status: ChargeStatus, fail_with: Option<u16>) -> Self {
        let Ok(parser) = OpenPixProvider::new(OpenPixConfig {
            app_id: None,
            base_url: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(1),
        }) else {
            panic!("parser construction failed");
        };
        Self {
            status,
            fail_with,
            calls: AtomicUsize::new(0),
            parser,
        }
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "openpix"
    }

    async fn create_charge(&self, request: &ChargeRequest) -> Result<ChargeResult, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.fail_with {
            return Err(ProviderError::Http {
                status,
                body: r#"{"error":"internal"}"#.to_string(),
            });
        }
        Ok(ChargeResult {
            provider: "openpix".to_string(),
            charge_id: format!("chg-{}", request.order_id),
            correlation_id: request.order_id.to_string(),
            status: self.status,
            br_code: "00020101021226880014br.gov.bcb.pix".to_string(),
            qr_code_image: "https://api.openpix.com.br/openpix/charge/brcode/image/x.png"
                .to_string(),
            payment_link_url: Some("https://openpix.com.br/pay/x".to_string()),
            expires_at: None,
            raw: serde_json::json!({"charge": {"status": "ACTIVE"}}),
        })
    }

    fn parse_webhook(&self, payload: &Value) -> Vec<NormalizedEvent> {
        self.parser.parse_webhook(payload)
    }
}

/// Notifier that records every message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<DownloadReady>>,
}

impl RecordingNotifier {
    pub async fn count(&self) -> usize {
        self.sent.lock().await.len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn download_ready(&self, message: &DownloadReady) -> Result<(), NotifyError> {
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

/// Store whose units of work fail when a poisoned provider event ID is
/// written to the ledger.
#[derive(Debug)]
pub struct PoisonedLedgerStore {
    pub inner: MemoryStore,
    pub poisoned_event_id: String,
}

#[async_trait]
impl Store for PoisonedLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, ShopError> {
        Ok(Box::new(PoisonedUnitOfWork {
            inner: self.inner.begin().await?,
            poisoned_event_id: self.poisoned_event_id.clone(),
        }))
    }
}

struct PoisonedUnitOfWork {
    inner: Box<dyn UnitOfWork>,
    poisoned_event_id: String,
}

#[async_trait]
impl UnitOfWork for PoisonedUnitOfWork {
    async fn find_published_photo(
        &mut self,
        photo_id: uuid::Uuid,
    ) -> Result<Option<Photo>, ShopError> {
        self.inner.find_published_photo(photo_id).await
    }

    async fn find_photo(&mut self, photo_id: uuid::Uuid) -> Result<Option<Photo>, ShopError> {
        self.inner.find_photo(photo_id).await
    }

    async fn upsert_customer(
        &mut self,
        customer: &NewCustomer,
        now: DateTime<Utc>,
    ) -> Result<Customer, ShopError> {
        self.inner.upsert_customer(customer, now).await
    }

    async fn find_customer(
        &mut self,
        customer_id: uuid::Uuid,
    ) -> Result<Option<Customer>, ShopError> {
        self.inner.find_customer(customer_id).await
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), ShopError> {
        self.inner.insert_order(order).await
    }

    async fn lock_order(&mut self, order_id: OrderId) -> Result<Option<Order>, ShopError> {
        self.inner.lock_order(order_id).await
    }

    async fn lock_order_by_provider_ref(
        &mut self,
        correlation_id: Option<&str>,
        charge_id: Option<&str>,
    ) -> Result<Option<Order>, ShopError> {
        self.inner
            .lock_order_by_provider_ref(correlation_id, charge_id)
            .await
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), ShopError> {
        self.inner.update_order(order).await
    }

    async fn insert_webhook_event(
        &mut self,
        event: &WebhookEventRecord,
    ) -> Result<bool, ShopError> {
        if event.provider_event_id == self.poisoned_event_id {
            return Err(ShopError::Persistence("ledger unavailable".to_string()));
        }
        self.inner.insert_webhook_event(event).await
    }

    async fn find_active_token(
        &mut self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadToken>, ShopError> {
        self.inner.find_active_token(order_id, now).await
    }

    async fn insert_token(&mut self, token: &DownloadToken) -> Result<(), ShopError> {
        self.inner.insert_token(token).await
    }

    async fn find_token(&mut self, token: &str) -> Result<Option<DownloadToken>, ShopError> {
        self.inner.find_token(token).await
    }

    async fn consume_token(
        &mut self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadToken>, ShopError> {
        self.inner.consume_token(token, now).await
    }

    async fn commit(self: Box<Self>) -> Result<(), ShopError> {
        self.inner.commit().await
    }
}

// ============================================================================
// App construction
// ============================================================================

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub provider: Arc<FakeProvider>,
    pub notifier: Arc<RecordingNotifier>,
    pub photo: Photo,
}

pub fn test_photo() -> Photo {
    Photo {
        id: uuid::Uuid::new_v4(),
        slug: "cachoeira".to_string(),
        title: "Cachoeira".to_string(),
        preview_url: "https://cdn.example/cachoeira-preview.jpg".to_string(),
        price_cents: 4990,
        original_public_id: "originals/cachoeira".to_string(),
        original_format: "jpg".to_string(),
        published: true,
    }
}

/// Builds the router over an in-memory store seeded with one published
/// photo.
pub async fn test_app(provider: FakeProvider) -> TestApp {
    let store = MemoryStore::new();
    let backend: Arc<dyn Store> = Arc::new(store.clone());
    test_app_with_backend(provider, store, backend).await
}

/// Same as [`test_app`] but routes every unit of work through `backend`,
/// which must wrap `store`.
pub async fn test_app_with_backend(
    provider: FakeProvider,
    store: MemoryStore,
    backend: Arc<dyn Store>,
) -> TestApp {
    let photo = test_photo();
    store.insert_photo(photo.clone()).await;

    let provider = Arc::new(provider);
    let notifier = Arc::new(RecordingNotifier::default());
    let dispatcher = NotificationDispatcher::new(
        Arc::clone(&notifier) as Arc<dyn Notifier>,
        Duration::from_secs(1),
    );
    let issuer = TokenIssuer::new(TokenPolicy::new(48, 5));

    let order_service = OrderService::new(
        Arc::clone(&backend),
        Arc::clone(&provider) as Arc<dyn PaymentProvider>,
        issuer,
        dispatcher.clone(),
        Arc::new(HmacUrlSigner::new(STORAGE_BASE, Some("signing".to_string()))),
        CheckoutSettings::default(),
    );
    let ingestion = IngestionService::new(
        backend,
        Arc::clone(&provider) as Arc<dyn PaymentProvider>,
        issuer,
        dispatcher,
        "http://localhost:3000".to_string(),
    );

    let state = AppState {
        order_service: Arc::new(order_service),
        ingestion: Arc::new(ingestion),
        webhook_secret: Some(Arc::from(WEBHOOK_SECRET)),
        admin_token: Some(Arc::from(ADMIN_TOKEN)),
    };

    TestApp {
        router: api::build_router().with_state(state),
        store,
        provider,
        notifier,
        photo,
    }
}

// ============================================================================
// Requests
// ============================================================================

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let Ok(response) = router.clone().oneshot(request).await else {
        panic!("router failed");
    };
    let status = response.status();
    let headers = response.headers().clone();
    let Ok(bytes) = axum::body::to_bytes(response.into_body(), usize::MAX).await else {
        panic!("body read failed");
    };
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    TestResponse {
        status,
        headers,
        json,
    }
}

fn build(builder: axum::http::request::Builder, body: Body) -> Request<Body> {
    let Ok(request) = builder.body(body) else {
        panic!("request construction failed");
    };
    request
}

pub fn get(uri: &str) -> Request<Body> {
    build(Request::builder().method("GET").uri(uri), Body::empty())
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    build(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json"),
        Body::from(body.to_string()),
    )
}

pub fn post_admin(uri: &str, token: &str) -> Request<Body> {
    build(
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("authorization", format!("Bearer {token}")),
        Body::empty(),
    )
}

pub fn webhook(body: &str, secret: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/pix/webhook/openpix")
        .header("content-type", "application/json");
    if let Some(secret) = secret {
        builder = builder.header("authorization", secret);
    }
    build(builder, Body::from(body.to_string()))
}

pub fn checkout_body(photo_id: uuid::Uuid) -> Value {
    serde_json::json!({
        "photoId": photo_id,
        "customerName": "Ana Souza",
        "customerEmail": "ana@example.com",
        "customerWhatsapp": "32988518799"
    })
}

/// Creates an order through the API and returns its ID.
pub async fn create_order(app: &TestApp) -> OrderId {
    let response = send(&app.router, post_json("/api/orders", &checkout_body(app.photo.id))).await;
    assert_eq!(response.status, StatusCode::OK, "checkout failed: {}", response.json);
    let Some(Ok(order_id)) = response
        .json
        .get("orderId")
        .and_then(Value::as_str)
        .map(str::parse::<OrderId>)
    else {
        panic!("orderId missing: {}", response.json);
    };
    order_id
}

pub fn paid_webhook(order_id: OrderId) -> String {
    serde_json::json!({
        "event": "OPENPIX:CHARGE_COMPLETED",
        "charge": {
            "status": "COMPLETED",
            "correlationID": order_id.to_string(),
            "identifier": format!("chg-{order_id}"),
            "transactionID": format!("tx-{order_id}")
        },
        "pix": { "value": 4990 }
    })
    .to_string()
}
