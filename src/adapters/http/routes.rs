//! Axum router configuration.
//!
//! Wires the wallet, operator, and webhook endpoints to their handlers.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{
    get_balance, get_transaction, handle_gateway_webhook, initiate_deposit, request_withdrawal,
    run_reconcile, settle_withdrawal, AppState,
};

/// Create the wallet API router.
///
/// # Routes (require the authenticated user header)
/// - `POST /deposits` - Start a deposit, returns signed redirect params
/// - `POST /withdrawals` - Reserve a withdrawal
/// - `GET /balance` - Three-bucket balance view
/// - `GET /transactions/:id` - One ledger transaction
pub fn wallet_routes() -> Router<AppState> {
    Router::new()
        .route("/deposits", post(initiate_deposit))
        .route("/withdrawals", post(request_withdrawal))
        .route("/balance", get(get_balance))
        .route("/transactions/:id", get(get_transaction))
}

/// Create the operator router (bearer-secret guarded).
///
/// # Routes
/// - `POST /settlements` - Confirm a payout of a reserved withdrawal
/// - `GET|POST /reconcile` - Run one reservation expiry pass; GET is
///   kept so a plain cron curl can trigger it
pub fn operator_routes() -> Router<AppState> {
    Router::new()
        .route("/settlements", post(settle_withdrawal))
        .route("/reconcile", get(run_reconcile).post(run_reconcile))
}

/// Create the webhook router.
///
/// Separate from the wallet routes because notifications carry no user
/// session; they are authenticated by source address and signature.
///
/// # Routes
/// - `POST /gateway` - Inbound payment notification
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/gateway", post(handle_gateway_webhook))
}

/// Create the complete application router.
pub fn app_router() -> Router<AppState> {
    Router::new()
        .nest("/wallet", wallet_routes())
        .nest("/operator", operator_routes())
        .nest("/webhooks", webhook_routes())
        .route("/health", get(health))
}

/// Liveness probe.
async fn health() -> &'static str {
    "ok"
}
