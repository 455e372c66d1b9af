//! pix-checkout server entry point.
//!
//! Wires configuration, storage, the payment provider and notifiers, then
//! starts the Axum HTTP server.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use pix_checkout::api;
use pix_checkout::app_state::AppState;
use pix_checkout::config::AppConfig;
use pix_checkout::domain::TokenPolicy;
use pix_checkout::notify::{
    LogNotifier, NotificationDispatcher, Notifier, ResendConfig, ResendNotifier,
};
use pix_checkout::payments::{OpenPixConfig, build_provider};
use pix_checkout::persistence::postgres::PoolSettings;
use pix_checkout::persistence::{MemoryStore, PostgresStore, Store};
use pix_checkout::service::{CheckoutSettings, IngestionService, OrderService, TokenIssuer};
use pix_checkout::storage::HmacUrlSigner;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = AppConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, provider = config.payment_provider.as_str(), "starting pix-checkout");

    // Storage
    let store: Arc<dyn Store> = if config.persistence_enabled {
        let settings = PoolSettings {
            database_url: config.database_url.clone(),
            max_connections: config.database_max_connections,
            min_connections: config.database_min_connections,
            acquire_timeout: Duration::from_secs(config.database_connect_timeout_secs),
        };
        let store = PostgresStore::connect(&settings).await?;
        tracing::info!("connected to PostgreSQL, migrations applied");
        Arc::new(store)
    } else {
        tracing::warn!("persistence disabled, using in-memory store");
        Arc::new(MemoryStore::new())
    };

    // Collaborators
    let provider = build_provider(
        config.payment_provider,
        OpenPixConfig {
            app_id: config.openpix_app_id.clone(),
            base_url: config.openpix_base_url.clone(),
            timeout: config.provider_timeout(),
        },
    )?;

    let notifier: Arc<dyn Notifier> = if config.resend_api_key.is_some() {
        let client = reqwest::Client::builder()
            .timeout(config.notify_timeout())
            .build()?;
        Arc::new(ResendNotifier::new(
            client,
            ResendConfig {
                api_key: config.resend_api_key.clone(),
                from_email: config.resend_from_email.clone(),
                brand_name: config.brand_name.clone(),
            },
        ))
    } else {
        tracing::warn!("RESEND_API_KEY not set, download notifications are only logged");
        Arc::new(LogNotifier)
    };
    let dispatcher = NotificationDispatcher::new(notifier, config.notify_timeout());

    let signer = Arc::new(HmacUrlSigner::new(
        &config.storage_base_url,
        config.storage_signing_secret.clone(),
    ));

    if config.webhook_secret.is_none() {
        tracing::warn!("WEBHOOK_SECRET not set, every webhook will be rejected");
    }

    // Build service layer
    let issuer = TokenIssuer::new(TokenPolicy::new(
        config.download_link_max_hours,
        config.download_max_uses,
    ));
    let order_service = Arc::new(OrderService::new(
        Arc::clone(&store),
        Arc::clone(&provider),
        issuer,
        dispatcher.clone(),
        signer,
        CheckoutSettings {
            app_url: config.app_url.clone(),
            pix_expires_minutes: config.pix_expires_minutes,
            signed_url_ttl: config.signed_url_ttl(),
        },
    ));
    let ingestion = Arc::new(IngestionService::new(
        store,
        provider,
        issuer,
        dispatcher,
        config.app_url.clone(),
    ));

    // Build application state
    let app_state = AppState {
        order_service,
        ingestion,
        webhook_secret: config.webhook_secret.as_deref().map(Arc::from),
        admin_token: config.admin_api_token.as_deref().map(Arc::from),
    };

    // Build router
    let app = Router::new()
        .merge(api::build_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
