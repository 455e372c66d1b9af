//! Placeholder adapter for selectable providers that have no integration.

use async_trait::async_trait;

use super::{ChargeRequest, ChargeResult, NormalizedEvent, PaymentProvider, ProviderError};

/// Provider that refuses every charge and ignores every webhook.
#[derive(Debug, Clone)]
pub struct UnsupportedProvider {
    name: &'static str,
}

impl UnsupportedProvider {
    /// Creates a placeholder for `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl PaymentProvider for UnsupportedProvider {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn create_charge(&self, _request: &ChargeRequest) -> Result<ChargeResult, ProviderError> {
        Err(ProviderError::Unsupported(self.name.to_string()))
    }

    fn parse_webhook(&self, _payload: &serde_json::Value) -> Vec<NormalizedEvent> {
        Vec::new()
    }
}
