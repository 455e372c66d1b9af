//! "Download ready" notifications.
//!
//! The service layer never sends email inside a unit of work. A committed
//! `PENDING → PAID` transition yields a [`DownloadReady`] value which is then
//! handed to [`NotificationDispatcher::dispatch`]. Dispatch is bounded by a
//! timeout and never fails: errors are logged and the order stays paid.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::AUTHORIZATION;
use serde::Serialize;

use crate::domain::OrderId;

/// Failure reported by a [`Notifier`].
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The mailer is missing credentials.
    #[error("notifier not configured: {0}")]
    NotConfigured(String),
    /// The mail API could not be reached or refused the message.
    #[error("notification delivery failed: {0}")]
    Delivery(String),
}

/// Everything needed to tell a customer their download is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadReady {
    /// Paid order.
    pub order_id: OrderId,
    /// Recipient name.
    pub customer_name: String,
    /// Recipient email.
    pub customer_email: String,
    /// Title of the purchased photo.
    pub photo_title: String,
    /// Redemption URL for the download token.
    pub download_url: String,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

/// Outbound notification channel.
#[async_trait]
pub trait Notifier: fmt::Debug + Send + Sync {
    /// Delivers a "download ready" message.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when the message could not be delivered.
    async fn download_ready(&self, message: &DownloadReady) -> Result<(), NotifyError>;
}

/// Bounded, best-effort delivery of notifications after commit.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
}

impl NotificationDispatcher {
    /// Wraps a notifier with a delivery timeout.
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        Self { notifier, timeout }
    }

    /// Sends the message, logging and swallowing any failure.
    ///
    /// Returns `true` if the notifier reported success in time.
    pub async fn dispatch(&self, message: &DownloadReady) -> bool {
        match tokio::time::timeout(self.timeout, self.notifier.download_ready(message)).await {
            Ok(Ok(())) => {
                tracing::info!(order_id = %message.order_id, "download-ready notification sent");
                true
            }
            Ok(Err(e)) => {
                tracing::warn!(order_id = %message.order_id, error = %e, "download-ready notification failed");
                false
            }
            Err(_) => {
                tracing::warn!(
                    order_id = %message.order_id,
                    timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
                    "download-ready notification timed out"
                );
                false
            }
        }
    }
}

/// Notifier that only logs. Used when no mail API key is configured in
/// development.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn download_ready(&self, message: &DownloadReady) -> Result<(), NotifyError> {
        tracing::info!(
            order_id = %message.order_id,
            to = %message.customer_email,
            url = %message.download_url,
            "download ready"
        );
        Ok(())
    }
}

/// Settings for [`ResendNotifier`].
#[derive(Debug, Clone)]
pub struct ResendConfig {
    /// API key; `None` makes every delivery fail as not configured.
    pub api_key: Option<String>,
    /// Sender address.
    pub from_email: String,
    /// Brand name shown in the message.
    pub brand_name: String,
}

/// Email delivery through the Resend HTTP API.
#[derive(Debug, Clone)]
pub struct ResendNotifier {
    client: reqwest::Client,
    config: ResendConfig,
}

#[derive(Debug, Serialize)]
struct ResendEmail<'a> {
    from: &'a str,
    to: &'a str,
    subject: String,
    html: String,
}

impl ResendNotifier {
    /// Creates the notifier.
    #[must_use]
    pub fn new(client: reqwest::Client, config: ResendConfig) -> Self {
        Self { client, config }
    }

    fn render(&self, message: &DownloadReady) -> (String, String) {
        let subject = format!("Seu download está liberado: {}", message.photo_title);
        let html = format!(
            "<div style=\"font-family: Arial, sans-serif; line-height: 1.4;\">\
             <h2>{brand}</h2>\
             <p>Oi {name}, seu pagamento foi confirmado.</p>\
             <p>Foto: <strong>{title}</strong></p>\
             <p>Link de download (expira em {expires}):</p>\
             <p><a href=\"{url}\">{url}</a></p>\
             </div>",
            brand = escape_html(&self.config.brand_name),
            name = escape_html(&message.customer_name),
            title = escape_html(&message.photo_title),
            expires = message.expires_at.format("%d/%m/%Y %H:%M UTC"),
            url = message.download_url,
        );
        (subject, html)
    }
}

/// Escapes text interpolated into the email body.
fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[async_trait]
impl Notifier for ResendNotifier {
    async fn download_ready(&self, message: &DownloadReady) -> Result<(), NotifyError> {
        let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Err(NotifyError::NotConfigured("RESEND_API_KEY is not set".to_string()));
        };

        let (subject, html) = self.render(message);
        let response = self
            .client
            .post("https://api.resend.com/emails")
            .header(AUTHORIZATION, format!("Bearer {api_key}"))
            .json(&ResendEmail {
                from: &self.config.from_email,
                to: &message.customer_email,
                subject,
                html,
            })
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifyError::Delivery(format!(
                "mail API returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct SlowNotifier;

    #[async_trait]
    impl Notifier for SlowNotifier {
        async fn download_ready(&self, _message: &DownloadReady) -> Result<(), NotifyError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn message() -> DownloadReady {
        DownloadReady {
            order_id: OrderId::new(),
            customer_name: "Ana".to_string(),
            customer_email: "ana@example.com".to_string(),
            photo_title: "Mar".to_string(),
            download_url: "http://localhost:3000/api/download/abc".to_string(),
            expires_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn slow_notifier_is_cut_off() {
        let dispatcher =
            NotificationDispatcher::new(Arc::new(SlowNotifier), Duration::from_millis(50));
        assert!(!dispatcher.dispatch(&message()).await);
    }

    #[tokio::test]
    async fn unconfigured_resend_fails_softly() {
        let notifier = ResendNotifier::new(
            reqwest::Client::new(),
            ResendConfig {
                api_key: None,
                from_email: "loja@example.com".to_string(),
                brand_name: "Fotografia".to_string(),
            },
        );
        assert!(matches!(
            notifier.download_ready(&message()).await,
            Err(NotifyError::NotConfigured(_))
        ));
        let dispatcher = NotificationDispatcher::new(Arc::new(notifier), Duration::from_secs(1));
        assert!(!dispatcher.dispatch(&message()).await);
    }

    #[test]
    fn rendered_email_contains_link() {
        let notifier = ResendNotifier::new(
            reqwest::Client::new(),
            ResendConfig {
                api_key: None,
                from_email: "loja@example.com".to_string(),
                brand_name: "Fotografia".to_string(),
            },
        );
        let (subject, html) = notifier.render(&message());
        assert!(subject.contains("Mar"));
        assert!(html.contains("http://localhost:3000/api/download/abc"));
    }

    #[test]
    fn buyer_supplied_text_is_escaped() {
        let notifier = ResendNotifier::new(
            reqwest::Client::new(),
            ResendConfig {
                api_key: None,
                from_email: "loja@example.com".to_string(),
                brand_name: "Fotografia".to_string(),
            },
        );
        let mut hostile = message();
        hostile.customer_name = "<script>alert(\"x\")</script>".to_string();
        hostile.photo_title = "Mar & Sol".to_string();

        let (_, html) = notifier.render(&hostile);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&quot;x&quot;)&lt;/script&gt;"));
        assert!(html.contains("Mar &amp; Sol"));
    }
}
