//! Data Transfer Objects for REST request/response serialization.
//!
//! Field names are camelCase on the wire.

pub mod order_dto;
pub mod webhook_dto;

pub use order_dto::*;
pub use webhook_dto::*;
