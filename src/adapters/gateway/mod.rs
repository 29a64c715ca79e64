//! Gateway adapters - outbound payment gateway integration.

mod client;

pub use client::HttpGatewayClient;
