//! Order service: checkout, status polling, admin overrides and downloads.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{TokenIssuer, download_ready_message};
use crate::domain::{
    Customer, DownloadToken, NewCustomer, Order, OrderId, OrderStatus, Photo, Transition,
};
use crate::error::ShopError;
use crate::notify::{DownloadReady, NotificationDispatcher};
use crate::payments::{ChargeRequest, ChargeStatus, PaymentProvider};
use crate::persistence::{Store, UnitOfWork};
use crate::storage::OriginUrlSigner;

const NAME_MIN_CHARS: usize = 2;
const NAME_MAX_CHARS: usize = 120;
const WHATSAPP_MAX_CHARS: usize = 30;
const EMAIL_MAX_CHARS: usize = 254;

/// Checkout knobs that do not belong to a collaborator.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Public base URL used to build download links.
    pub app_url: String,
    /// Validity window of a Pix charge.
    pub pix_expires_minutes: u32,
    /// Lifetime of the signed origin URL a redemption redirects to.
    pub signed_url_ttl: Duration,
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:3000".to_string(),
            pix_expires_minutes: 30,
            signed_url_ttl: Duration::from_secs(300),
        }
    }
}

/// Raw checkout input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    /// Photo to buy.
    pub photo_id: uuid::Uuid,
    /// Buyer name, 2 to 120 characters.
    pub customer_name: String,
    /// Buyer email.
    pub customer_email: String,
    /// Optional WhatsApp contact, at most 30 characters.
    pub customer_whatsapp: Option<String>,
}

impl NewOrder {
    /// Checks field constraints and returns the normalized customer.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<NewCustomer, ShopError> {
        let customer = NewCustomer::normalized(
            &self.customer_name,
            &self.customer_email,
            self.customer_whatsapp.as_deref(),
        );

        let name_len = customer.name.chars().count();
        if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&name_len) {
            return Err(ShopError::Validation(format!(
                "customerName must have between {NAME_MIN_CHARS} and {NAME_MAX_CHARS} characters"
            )));
        }
        if !is_plausible_email(&customer.email) {
            return Err(ShopError::Validation(
                "customerEmail is not a valid email address".to_string(),
            ));
        }
        if customer
            .whatsapp
            .as_ref()
            .is_some_and(|w| w.chars().count() > WHATSAPP_MAX_CHARS)
        {
            return Err(ShopError::Validation(format!(
                "customerWhatsapp must have at most {WHATSAPP_MAX_CHARS} characters"
            )));
        }
        Ok(customer)
    }
}

fn is_plausible_email(email: &str) -> bool {
    if email.len() > EMAIL_MAX_CHARS || email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

/// What the buyer needs to pay for a freshly created order.
#[derive(Debug, Clone, PartialEq)]
pub struct Checkout {
    /// New order.
    pub order_id: OrderId,
    /// Order status after the charge was recorded.
    pub status: OrderStatus,
    /// Copy-paste payment code.
    pub br_code: String,
    /// QR code image reference.
    pub qr_code_image: String,
    /// Optional hosted payment page.
    pub payment_link_url: Option<String>,
    /// Optional charge expiry.
    pub expires_at: Option<DateTime<Utc>>,
}

/// Order status as shown to the buyer while polling.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderView {
    /// The order.
    pub order: Order,
    /// Its buyer.
    pub customer: Customer,
    /// The purchased photo.
    pub photo: Photo,
    /// Active download token, present only for paid orders.
    pub download: Option<DownloadToken>,
}

/// Orchestrates the order lifecycle outside of webhooks.
#[derive(Debug, Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    provider: Arc<dyn PaymentProvider>,
    issuer: TokenIssuer,
    notifier: NotificationDispatcher,
    signer: Arc<dyn OriginUrlSigner>,
    settings: CheckoutSettings,
}

impl OrderService {
    /// Creates a new `OrderService`.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        provider: Arc<dyn PaymentProvider>,
        issuer: TokenIssuer,
        notifier: NotificationDispatcher,
        signer: Arc<dyn OriginUrlSigner>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            store,
            provider,
            issuer,
            notifier,
            signer,
            settings,
        }
    }

    /// Creates a `PENDING` order and its provider charge.
    ///
    /// The order is committed before the provider is called. If the charge
    /// fails the order is canceled with the error recorded as provider
    /// payload.
    ///
    /// # Errors
    ///
    /// - [`ShopError::Validation`] for invalid input.
    /// - [`ShopError::PhotoNotFound`] if the photo is unknown or unpublished.
    /// - Provider failures mapped through `From<ProviderError>`.
    /// - [`ShopError::Persistence`] on storage failure.
    pub async fn create_order(&self, input: &NewOrder) -> Result<Checkout, ShopError> {
        let new_customer = input.validate()?;
        let now = Utc::now();

        let mut uow = self.store.begin().await?;
        let Some(photo) = uow.find_published_photo(input.photo_id).await? else {
            return Err(ShopError::PhotoNotFound(input.photo_id));
        };
        let customer = uow.upsert_customer(&new_customer, now).await?;
        let order = Order::new_pending(
            photo.id,
            customer.id,
            photo.price_cents,
            self.provider.name(),
            now,
        );
        uow.insert_order(&order).await?;
        uow.commit().await?;
        tracing::info!(order_id = %order.id, photo_id = %photo.id, amount_cents = order.amount_cents, "order created");

        let request = ChargeRequest {
            order_id: order.id,
            amount_cents: photo.price_cents,
            customer_name: customer.name.clone(),
            customer_email: customer.email.clone(),
            customer_contact: customer.whatsapp.clone(),
            description: format!("Compra da foto \"{}\"", photo.title),
            expires_in_seconds: u64::from(self.settings.pix_expires_minutes) * 60,
        };

        let charge = match self.provider.create_charge(&request).await {
            Ok(charge) => charge,
            Err(e) => {
                tracing::warn!(order_id = %order.id, error = %e, "charge creation failed");
                self.cancel_after_charge_failure(order.id, e.audit_record())
                    .await;
                return Err(e.into());
            }
        };

        let mut uow = self.store.begin().await?;
        let Some(mut current) = uow.lock_order(order.id).await? else {
            return Err(ShopError::Internal(format!("order {} vanished", order.id)));
        };
        current.record_charge(
            &charge.provider,
            &charge.charge_id,
            &charge.correlation_id,
            charge.raw.clone(),
        );
        let transition = match OrderStatus::from(charge.status) {
            OrderStatus::Paid => current.mark_paid(now, None),
            OrderStatus::Canceled => current.cancel(now, None),
            OrderStatus::Pending | OrderStatus::Expired => Transition::Unchanged,
        };
        uow.update_order(&current).await?;

        let notification = if charge.status == ChargeStatus::Paid && transition.is_applied() {
            self.issue_and_describe(uow.as_mut(), &current, now).await?
        } else {
            None
        };
        uow.commit().await?;

        tracing::info!(
            order_id = %current.id,
            charge_id = %charge.charge_id,
            status = %current.status,
            "charge recorded"
        );
        if let Some(message) = notification {
            self.notifier.dispatch(&message).await;
        }

        Ok(Checkout {
            order_id: current.id,
            status: current.status,
            br_code: charge.br_code,
            qr_code_image: charge.qr_code_image,
            payment_link_url: charge.payment_link_url,
            expires_at: charge.expires_at,
        })
    }

    async fn cancel_after_charge_failure(&self, order_id: OrderId, record: serde_json::Value) {
        let result: Result<(), ShopError> = async {
            let mut uow = self.store.begin().await?;
            if let Some(mut order) = uow.lock_order(order_id).await?
                && order
                    .cancel(Utc::now(), Some(record))
                    .is_applied()
            {
                uow.update_order(&order).await?;
            }
            uow.commit().await
        }
        .await;

        if let Err(e) = result {
            tracing::error!(%order_id, error = %e, "failed to cancel order after charge failure");
        }
    }

    /// Returns the order status view, lazily issuing a download token for a
    /// paid order that has no active one.
    ///
    /// # Errors
    ///
    /// - [`ShopError::OrderNotFound`] if the order does not exist.
    /// - [`ShopError::Persistence`] on storage failure.
    pub async fn order_view(&self, order_id: OrderId) -> Result<OrderView, ShopError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let Some(order) = uow.lock_order(order_id).await? else {
            return Err(ShopError::OrderNotFound(*order_id.as_uuid()));
        };
        let (Some(customer), Some(photo)) = (
            uow.find_customer(order.customer_id).await?,
            uow.find_photo(order.photo_id).await?,
        ) else {
            return Err(ShopError::Internal(format!(
                "order {order_id} references missing rows"
            )));
        };

        let download = if order.status == OrderStatus::Paid {
            Some(self.issuer.ensure(uow.as_mut(), order.id, now).await?)
        } else {
            None
        };
        uow.commit().await?;

        Ok(OrderView {
            order,
            customer,
            photo,
            download,
        })
    }

    /// Admin override: marks a pending order as paid.
    ///
    /// The override is recorded as provider payload. Returns the status after
    /// the call; an already paid order is left untouched.
    ///
    /// # Errors
    ///
    /// - [`ShopError::OrderNotFound`] if the order does not exist.
    /// - [`ShopError::InvalidTransition`] if the order is canceled or
    ///   expired.
    /// - [`ShopError::Persistence`] on storage failure.
    pub async fn mark_paid_manually(&self, order_id: OrderId) -> Result<OrderStatus, ShopError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let Some(mut order) = uow.lock_order(order_id).await? else {
            return Err(ShopError::OrderNotFound(*order_id.as_uuid()));
        };

        let audit = serde_json::json!({ "source": "manual_admin", "at": now.to_rfc3339() });
        let notification = match order.mark_paid(now, Some(audit)) {
            Transition::Applied => {
                uow.update_order(&order).await?;
                self.issue_and_describe(uow.as_mut(), &order, now).await?
            }
            Transition::Unchanged => None,
            Transition::Rejected { from } => {
                return Err(invalid_transition(order_id, from, OrderStatus::Paid));
            }
        };
        uow.commit().await?;

        if let Some(message) = notification {
            tracing::info!(%order_id, "order manually marked as paid");
            self.notifier.dispatch(&message).await;
        }
        Ok(order.status)
    }

    /// Admin cancellation of a pending order.
    ///
    /// # Errors
    ///
    /// - [`ShopError::OrderNotFound`] if the order does not exist.
    /// - [`ShopError::InvalidTransition`] if the order is paid or expired.
    /// - [`ShopError::Persistence`] on storage failure.
    pub async fn cancel(&self, order_id: OrderId) -> Result<OrderStatus, ShopError> {
        let mut uow = self.store.begin().await?;
        let Some(mut order) = uow.lock_order(order_id).await? else {
            return Err(ShopError::OrderNotFound(*order_id.as_uuid()));
        };

        match order.cancel(Utc::now(), None) {
            Transition::Applied => {
                uow.update_order(&order).await?;
                uow.commit().await?;
                tracing::info!(%order_id, "order canceled");
            }
            Transition::Unchanged => {}
            Transition::Rejected { from } => {
                return Err(invalid_transition(order_id, from, OrderStatus::Canceled));
            }
        }
        Ok(order.status)
    }

    /// Redeems one use of a download token and returns the signed URL of
    /// the original file.
    ///
    /// The signed URL is minted before commit so a signing failure does not
    /// burn a use.
    ///
    /// # Errors
    ///
    /// - [`ShopError::TokenNotFound`] / [`ShopError::TokenGone`] as
    ///   reported by [`TokenIssuer::consume`].
    /// - [`ShopError::Configuration`] if the storage signer lacks
    ///   credentials.
    /// - [`ShopError::Persistence`] on storage failure.
    pub async fn redeem(&self, token: &str) -> Result<String, ShopError> {
        let now = Utc::now();
        let mut uow = self.store.begin().await?;
        let redemption = self.issuer.consume(uow.as_mut(), token, now).await?;
        let Some(photo) = uow.find_photo(redemption.order.photo_id).await? else {
            return Err(ShopError::PhotoNotFound(redemption.order.photo_id));
        };

        let ttl = chrono::Duration::from_std(self.settings.signed_url_ttl)
            .map_err(|e| ShopError::Internal(e.to_string()))?;
        let url = self.signer.signed_original_url(&photo, now + ttl)?;
        uow.commit().await?;
        Ok(url)
    }

    async fn issue_and_describe(
        &self,
        uow: &mut dyn UnitOfWork,
        order: &Order,
        now: DateTime<Utc>,
    ) -> Result<Option<DownloadReady>, ShopError> {
        let token = self.issuer.ensure(uow, order.id, now).await?;
        download_ready_message(uow, order, &token, &self.settings.app_url).await
    }
}

fn invalid_transition(order_id: OrderId, from: OrderStatus, to: OrderStatus) -> ShopError {
    ShopError::InvalidTransition {
        order_id: *order_id.as_uuid(),
        from: from.as_str(),
        to: to.as_str(),
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::TokenPolicy;
    use std::sync::atomic::Ordering;

    use crate::persistence::MemoryStore;
    use crate::service::testing::{FakeProvider, RecordingNotifier, dispatcher, photo};
    use crate::storage::HmacUrlSigner;

    struct Harness {
        store: MemoryStore,
        provider: Arc<FakeProvider>,
        notifier: Arc<RecordingNotifier>,
        service: OrderService,
        photo: Photo,
    }

    async fn harness(provider: FakeProvider) -> Harness {
        let store = MemoryStore::new();
        let photo = photo();
        store.insert_photo(photo.clone()).await;
        let provider = Arc::new(provider);
        let notifier = Arc::new(RecordingNotifier::default());
        let service = OrderService::new(
            Arc::new(store.clone()),
            Arc::clone(&provider) as Arc<dyn PaymentProvider>,
            TokenIssuer::new(TokenPolicy::new(48, 5)),
            dispatcher(&notifier),
            Arc::new(HmacUrlSigner::new(
                "https://files.example",
                Some("sign".to_string()),
            )),
            CheckoutSettings::default(),
        );
        Harness {
            store,
            provider,
            notifier,
            service,
            photo,
        }
    }

    fn input(photo_id: uuid::Uuid) -> NewOrder {
        NewOrder {
            photo_id,
            customer_name: "Ana Souza".to_string(),
            customer_email: "Ana@Example.com".to_string(),
            customer_whatsapp: Some("(32) 98851-8799".to_string()),
        }
    }

    #[test]
    fn validation_rules() {
        let base = input(uuid::Uuid::new_v4());
        assert!(base.validate().is_ok());

        let short = NewOrder {
            customer_name: " A ".to_string(),
            ..base.clone()
        };
        assert!(matches!(short.validate(), Err(ShopError::Validation(_))));

        let bad_email = NewOrder {
            customer_email: "ana.example.com".to_string(),
            ..base.clone()
        };
        assert!(matches!(bad_email.validate(), Err(ShopError::Validation(_))));

        let long_phone = NewOrder {
            customer_whatsapp: Some("9".repeat(31)),
            ..base.clone()
        };
        assert!(matches!(long_phone.validate(), Err(ShopError::Validation(_))));

        let blank_phone = NewOrder {
            customer_whatsapp: Some(String::new()),
            ..base
        };
        let Ok(customer) = blank_phone.validate() else {
            panic!("blank whatsapp must be accepted");
        };
        assert!(customer.whatsapp.is_none());
    }

    #[tokio::test]
    async fn pending_charge_leaves_order_pending() {
        let h = harness(FakeProvider::answering(ChargeStatus::Pending)).await;
        let Ok(checkout) = h.service.create_order(&input(h.photo.id)).await else {
            panic!("checkout failed");
        };
        assert_eq!(checkout.status, OrderStatus::Pending);
        assert_eq!(checkout.br_code, "00020101021226");

        let Some(order) = h.store.order(checkout.order_id).await else {
            panic!("order not stored");
        };
        assert_eq!(order.amount_cents, 4990);
        assert_eq!(
            order.provider_correlation_id.as_deref(),
            Some(checkout.order_id.to_string().as_str())
        );
        assert!(h.store.tokens_for(order.id).await.is_empty());
    }

    #[tokio::test]
    async fn instantly_paid_charge_issues_token_and_notifies() {
        let h = harness(FakeProvider::answering(ChargeStatus::Paid)).await;
        let Ok(checkout) = h.service.create_order(&input(h.photo.id)).await else {
            panic!("checkout failed");
        };
        assert_eq!(checkout.status, OrderStatus::Paid);
        assert_eq!(h.store.tokens_for(checkout.order_id).await.len(), 1);

        let sent = h.notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent.first().map(|m| m.customer_email.as_str()), Some("ana@example.com"));
    }

    #[tokio::test]
    async fn provider_failure_cancels_order() {
        let h = harness(FakeProvider::failing(500)).await;
        let result = h.service.create_order(&input(h.photo.id)).await;
        assert!(matches!(result, Err(ShopError::ProviderUnavailable(_))));

        let orders = h.store.orders().await;
        let [order] = orders.as_slice() else {
            panic!("exactly one order expected");
        };
        assert_eq!(order.status, OrderStatus::Canceled);
        assert!(order.canceled_at.is_some());
        let Some(raw) = order.provider_raw.as_ref() else {
            panic!("charge failure not recorded");
        };
        assert_eq!(
            raw.get("error"),
            Some(&serde_json::json!("payment provider returned HTTP 500"))
        );
        assert_eq!(raw.get("status"), Some(&serde_json::json!(500)));
        assert_eq!(raw.get("body"), Some(&serde_json::json!("upstream exploded")));
        assert!(h.notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_photo_is_not_found_and_provider_untouched() {
        let h = harness(FakeProvider::answering(ChargeStatus::Pending)).await;
        let missing = uuid::Uuid::new_v4();
        let result = h.service.create_order(&input(missing)).await;
        assert!(matches!(result, Err(ShopError::PhotoNotFound(id)) if id == missing));
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), 0);
        assert!(h.store.orders().await.is_empty());
    }

    #[tokio::test]
    async fn manual_paid_then_cancel_is_rejected() {
        let h = harness(FakeProvider::answering(ChargeStatus::Pending)).await;
        let Ok(checkout) = h.service.create_order(&input(h.photo.id)).await else {
            panic!("checkout failed");
        };

        assert!(matches!(
            h.service.mark_paid_manually(checkout.order_id).await,
            Ok(OrderStatus::Paid)
        ));
        assert!(matches!(
            h.service.mark_paid_manually(checkout.order_id).await,
            Ok(OrderStatus::Paid)
        ));
        assert_eq!(h.notifier.sent.lock().await.len(), 1);
        assert_eq!(h.store.tokens_for(checkout.order_id).await.len(), 1);

        assert!(matches!(
            h.service.cancel(checkout.order_id).await,
            Err(ShopError::InvalidTransition { from: "PAID", to: "CANCELED", .. })
        ));
    }

    #[tokio::test]
    async fn canceled_order_cannot_be_paid_manually() {
        let h = harness(FakeProvider::answering(ChargeStatus::Pending)).await;
        let Ok(checkout) = h.service.create_order(&input(h.photo.id)).await else {
            panic!("checkout failed");
        };
        assert!(matches!(h.service.cancel(checkout.order_id).await, Ok(OrderStatus::Canceled)));
        assert!(matches!(
            h.service.mark_paid_manually(checkout.order_id).await,
            Err(ShopError::InvalidTransition { .. })
        ));
        assert!(h.notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn order_view_lazily_issues_token() {
        let h = harness(FakeProvider::answering(ChargeStatus::Pending)).await;
        let Ok(checkout) = h.service.create_order(&input(h.photo.id)).await else {
            panic!("checkout failed");
        };

        let Ok(view) = h.service.order_view(checkout.order_id).await else {
            panic!("view failed");
        };
        assert!(view.download.is_none());
        assert_eq!(view.photo.slug, "por-do-sol");

        // Simulate a paid order whose token was never minted.
        let Ok(mut uow) = h.store.begin().await else {
            panic!("begin failed");
        };
        let Ok(Some(mut order)) = uow.lock_order(checkout.order_id).await else {
            panic!("order missing");
        };
        order.mark_paid(Utc::now(), None);
        assert!(uow.update_order(&order).await.is_ok());
        assert!(uow.commit().await.is_ok());

        let Ok(first) = h.service.order_view(checkout.order_id).await else {
            panic!("view failed");
        };
        let Ok(second) = h.service.order_view(checkout.order_id).await else {
            panic!("view failed");
        };
        let (Some(a), Some(b)) = (first.download, second.download) else {
            panic!("paid order must expose a token");
        };
        assert_eq!(a.token, b.token);
        assert_eq!(a.remaining_downloads, 5);
    }

    #[tokio::test]
    async fn redeem_decrements_and_signs() {
        let h = harness(FakeProvider::answering(ChargeStatus::Paid)).await;
        let Ok(checkout) = h.service.create_order(&input(h.photo.id)).await else {
            panic!("checkout failed");
        };
        let tokens = h.store.tokens_for(checkout.order_id).await;
        let Some(token) = tokens.first() else {
            panic!("token missing");
        };

        let Ok(url) = h.service.redeem(&token.token).await else {
            panic!("redeem failed");
        };
        assert!(url.starts_with("https://files.example/originals/por-do-sol.jpg?expires="));
        let tokens = h.store.tokens_for(checkout.order_id).await;
        assert_eq!(tokens.first().map(|t| t.remaining_downloads), Some(4));
    }

    #[tokio::test]
    async fn unconfigured_signer_does_not_burn_a_use() {
        let h = harness(FakeProvider::answering(ChargeStatus::Paid)).await;
        let Ok(checkout) = h.service.create_order(&input(h.photo.id)).await else {
            panic!("checkout failed");
        };
        let service = OrderService {
            signer: Arc::new(HmacUrlSigner::new("https://files.example", None)),
            ..h.service.clone()
        };
        let tokens = h.store.tokens_for(checkout.order_id).await;
        let Some(token) = tokens.first() else {
            panic!("token missing");
        };
        assert!(matches!(
            service.redeem(&token.token).await,
            Err(ShopError::Configuration(_))
        ));
        let tokens = h.store.tokens_for(checkout.order_id).await;
        assert_eq!(tokens.first().map(|t| t.remaining_downloads), Some(5));
    }
}
