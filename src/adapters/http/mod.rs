//! HTTP adapters - Axum handlers, routes, and DTOs.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use handlers::{AppState, AuthenticatedUser, GatewaySettings};
pub use routes::app_router;
