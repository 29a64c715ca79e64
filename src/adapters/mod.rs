//! Adapters - Concrete implementations of the ports.
//!
//! - `postgres` - sqlx-backed storage adapters
//! - `gateway` - outbound HTTP client for gateway validation
//! - `http` - inbound Axum surface (wallet API, webhook, operator)

pub mod gateway;
pub mod http;
pub mod postgres;
