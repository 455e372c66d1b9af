//! Download token issuance and redemption.

use chrono::{DateTime, Utc};

use crate::domain::{DownloadToken, Order, OrderId, OrderStatus, TokenPolicy};
use crate::error::ShopError;
use crate::persistence::UnitOfWork;

/// A successfully consumed token together with its paid order.
#[derive(Debug, Clone, PartialEq)]
pub struct Redemption {
    /// Token after the decrement.
    pub token: DownloadToken,
    /// Order the token belongs to.
    pub order: Order,
}

/// Mints and consumes download tokens inside a caller-provided unit of work.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenIssuer {
    policy: TokenPolicy,
}

impl TokenIssuer {
    /// Creates an issuer applying `policy` to new tokens.
    #[must_use]
    pub const fn new(policy: TokenPolicy) -> Self {
        Self { policy }
    }

    /// Returns the newest active token of the order, minting one if none
    /// exists.
    ///
    /// The caller must hold the order lock so that two units of work cannot
    /// both mint.
    ///
    /// # Errors
    ///
    /// Returns [`ShopError::Persistence`] on storage failure.
    pub async fn ensure(
        &self,
        uow: &mut dyn UnitOfWork,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<DownloadToken, ShopError> {
        if let Some(existing) = uow.find_active_token(order_id, now).await? {
            return Ok(existing);
        }

        let token = self.policy.mint(order_id, now);
        uow.insert_token(&token).await?;
        tracing::info!(
            %order_id,
            expires_at = %token.expires_at,
            remaining = token.remaining_downloads,
            "download token issued"
        );
        Ok(token)
    }

    /// Uses up one download of `token`.
    ///
    /// # Errors
    ///
    /// - [`ShopError::TokenNotFound`] if no such token exists.
    /// - [`ShopError::TokenGone`] if it expired, has no uses left, its order
    ///   is not `PAID`, or a concurrent redemption took the last use.
    /// - [`ShopError::Persistence`] on storage failure.
    pub async fn consume(
        &self,
        uow: &mut dyn UnitOfWork,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Redemption, ShopError> {
        let Some(found) = uow.find_token(token).await? else {
            return Err(ShopError::TokenNotFound);
        };
        if !found.is_active(now) {
            return Err(ShopError::TokenGone);
        }

        let order = match uow.lock_order(found.order_id).await? {
            Some(order) if order.status == OrderStatus::Paid => order,
            _ => {
                tracing::warn!(order_id = %found.order_id, "token presented for unpaid order");
                return Err(ShopError::TokenGone);
            }
        };

        let Some(used) = uow.consume_token(token, now).await? else {
            return Err(ShopError::TokenGone);
        };
        tracing::info!(
            order_id = %order.id,
            remaining = used.remaining_downloads,
            "download token redeemed"
        );
        Ok(Redemption { token: used, order })
    }
}
