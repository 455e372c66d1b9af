//! REST endpoint handlers organized by resource.

pub mod admin;
pub mod download;
pub mod orders;
pub mod system;
pub mod webhook;

use axum::Router;

use crate::app_state::AppState;
use crate::domain::OrderId;
use crate::error::ShopError;

/// Composes all resource routes under `/api`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(orders::routes())
        .merge(admin::routes())
        .merge(webhook::routes())
        .merge(download::routes())
}

fn parse_order_id(raw: &str) -> Result<OrderId, ShopError> {
    raw.parse()
        .map_err(|_| ShopError::Validation(format!("invalid order id: {raw}")))
}
