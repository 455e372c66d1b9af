//! Domain layer: orders, customers, download tokens and ledger entries.
//!
//! Everything here is plain data plus the order state machine. Nothing in
//! this module performs I/O; persistence and orchestration live in
//! [`crate::persistence`] and [`crate::service`].

pub mod customer;
pub mod order;
pub mod order_id;
pub mod token;
pub mod webhook_event;

pub use customer::{Customer, NewCustomer, Photo};
pub use order::{Order, OrderStatus, Transition};
pub use order_id::OrderId;
pub use token::{DownloadToken, TokenPolicy};
pub use webhook_event::WebhookEventRecord;
