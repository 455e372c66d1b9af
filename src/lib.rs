//! # pix-checkout
//!
//! Order and payment lifecycle engine for selling photo originals through a
//! Pix checkout.
//!
//! A buyer creates an order, the payment provider issues a Pix charge, and
//! the provider's webhooks move the order to `PAID` exactly once. Paying
//! issues a download token with a limited lifetime and use count, which the
//! buyer redeems for a short-lived signed URL of the original file.
//!
//! ## Architecture
//!
//! ```text
//! Clients (HTTP)            Payment provider (webhooks)
//!     │                           │
//!     ├── REST Handlers (api/) ◄──┘
//!     │
//!     ├── OrderService / IngestionService (service/)
//!     │       ├── TokenIssuer
//!     │       ├── PaymentProvider (payments/)
//!     │       ├── Notifier (notify)
//!     │       └── OriginUrlSigner (storage)
//!     │
//!     ├── Order state machine (domain/)
//!     │
//!     └── Store / UnitOfWork (persistence/): PostgreSQL or in-memory
//! ```

pub mod api;
pub mod app_state;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod payments;
pub mod persistence;
pub mod security;
pub mod service;
pub mod storage;
