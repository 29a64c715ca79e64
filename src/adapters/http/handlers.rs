//! HTTP handlers for wallet, webhook, and reconciler endpoints.
//!
//! These handlers connect Axum routes to application layer command
//! handlers. Everything stateful arrives through [`AppState`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Json, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

use crate::application::handlers::{
    ExpireReservationsHandler, InitiateDepositCommand, InitiateDepositHandler,
    ProcessNotificationCommand, ProcessNotificationHandler, RequestWithdrawalCommand,
    RequestWithdrawalHandler, ReturnUrls, SettleWithdrawalCommand, SettleWithdrawalHandler,
    SettleWithdrawalResult,
};
use crate::config::{AppConfig, ValidationError};
use crate::domain::foundation::{Money, TransactionId, UserId};
use crate::domain::gateway::{
    extract_client_ip, AllowRule, SignatureVerifier, SourceAuthenticator,
};
use crate::domain::wallet::WalletError;
use crate::ports::{AuditSink, GatewayClient, LedgerStore, ReservationStore};

use super::dto::{
    BalanceResponse, DepositRequest, DepositResponse, ErrorResponse, ReconcileResponse,
    SettleRequest, TransactionResponse, WithdrawalRequest, WithdrawalResponse,
};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Everything the HTTP layer needs from configuration, resolved once at
/// startup so request handling never re-parses config strings.
#[derive(Clone)]
pub struct GatewaySettings {
    pub merchant_id: String,
    pub merchant_key: SecretString,
    pub passphrase: Option<SecretString>,
    pub process_url: String,
    pub confirm_with_gateway: bool,
    /// Empty means the gateway's published ranges.
    pub allowlist: Vec<AllowRule>,
    pub skip_source_check: bool,
    pub return_urls: ReturnUrls,
    pub deposit_min: Money,
    pub deposit_max: Money,
    pub withdrawal_min: Money,
    pub withdrawal_max: Money,
    pub trigger_secret: Option<SecretString>,
    pub reconciler_batch_limit: u32,
}

impl GatewaySettings {
    /// Resolves settings from validated configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, ValidationError> {
        let (deposit_min, deposit_max) = config.gateway.deposit_bounds()?;
        let (withdrawal_min, withdrawal_max) = config.gateway.withdrawal_bounds()?;
        Ok(Self {
            merchant_id: config.gateway.merchant_id.clone(),
            merchant_key: config.gateway.merchant_key.clone(),
            passphrase: config.gateway.passphrase.clone(),
            process_url: config.gateway.process_url.clone(),
            confirm_with_gateway: config.gateway.confirm_with_gateway,
            allowlist: config.gateway.allow_rules()?,
            skip_source_check: config.gateway.skip_source_check,
            return_urls: ReturnUrls::from_base(&config.gateway.site_base_url),
            deposit_min,
            deposit_max,
            withdrawal_min,
            withdrawal_max,
            trigger_secret: config.reconciler.trigger_secret.clone(),
            reconciler_batch_limit: config.reconciler.batch_limit,
        })
    }
}

/// Shared application state containing all dependencies.
///
/// Cloned per request; everything heavy lives behind an Arc.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerStore>,
    pub gateway: Arc<dyn GatewayClient>,
    pub audit: Arc<dyn AuditSink>,
    pub reservations: Arc<dyn ReservationStore>,
    pub settings: Arc<GatewaySettings>,
}

impl AppState {
    fn verifier(&self) -> SignatureVerifier {
        SignatureVerifier::new(self.settings.passphrase.clone())
    }

    fn source_authenticator(&self) -> SourceAuthenticator {
        if self.settings.allowlist.is_empty() {
            SourceAuthenticator::with_default_allowlist(self.settings.skip_source_check)
        } else {
            SourceAuthenticator::new(
                self.settings.allowlist.clone(),
                self.settings.skip_source_check,
            )
        }
    }

    /// Create handlers on demand from the shared state.
    pub fn process_notification_handler(&self) -> ProcessNotificationHandler {
        ProcessNotificationHandler::new(
            self.ledger.clone(),
            self.gateway.clone(),
            self.audit.clone(),
            self.source_authenticator(),
            self.verifier(),
            self.settings.merchant_id.clone(),
            self.settings.confirm_with_gateway,
        )
    }

    pub fn initiate_deposit_handler(&self) -> InitiateDepositHandler {
        InitiateDepositHandler::new(
            self.ledger.clone(),
            self.verifier(),
            self.settings.merchant_id.clone(),
            self.settings.merchant_key.clone(),
            self.settings.process_url.clone(),
            self.settings.return_urls.clone(),
            self.settings.deposit_min,
            self.settings.deposit_max,
        )
    }

    pub fn request_withdrawal_handler(&self) -> RequestWithdrawalHandler {
        RequestWithdrawalHandler::new(
            self.ledger.clone(),
            self.audit.clone(),
            self.settings.withdrawal_min,
            self.settings.withdrawal_max,
        )
    }

    pub fn settle_withdrawal_handler(&self) -> SettleWithdrawalHandler {
        SettleWithdrawalHandler::new(self.ledger.clone(), self.audit.clone())
    }

    pub fn expire_reservations_handler(&self) -> ExpireReservationsHandler {
        ExpireReservationsHandler::new(
            self.reservations.clone(),
            self.audit.clone(),
            self.settings.reconciler_batch_limit,
        )
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// User Context
// ════════════════════════════════════════════════════════════════════════════════

/// Authenticated user context extracted from the request.
///
/// The marketplace's session layer terminates auth upstream and passes
/// the verified identity in the X-User-Id header.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: UserId,
}

/// Rejection type for AuthenticatedUser extraction.
pub struct AuthenticationRequired;

impl IntoResponse for AuthenticationRequired {
    fn into_response(self) -> Response {
        let error = ErrorResponse::new("AUTHENTICATION_REQUIRED", "Authentication is required");
        (StatusCode::UNAUTHORIZED, Json(error)).into_response()
    }
}

impl<S> axum::extract::FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = AuthenticationRequired;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut axum::http::request::Parts,
        _state: &'life1 S,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self, Self::Rejection>> + Send + 'async_trait>,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            let user_id = parts
                .headers
                .get("X-User-Id")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<UserId>().ok())
                .ok_or(AuthenticationRequired)?;
            Ok(AuthenticatedUser { user_id })
        })
    }
}

/// Guards the operator endpoints (settlement, reconcile trigger).
///
/// Compares the bearer token against the configured shared secret in
/// constant time. An unset secret leaves the endpoint open and logs a
/// loud warning, for local development only.
fn operator_authorized(settings: &GatewaySettings, headers: &HeaderMap) -> Result<(), Response> {
    let Some(secret) = &settings.trigger_secret else {
        tracing::warn!(
            "OPERATOR ENDPOINT UNGUARDED - no trigger secret configured. \
             Never run with this setting in production."
        );
        return Ok(());
    };

    let supplied = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let authorized = match supplied {
        Some(token) => {
            let expected = secret.expose_secret().as_bytes();
            let token = token.as_bytes();
            token.len() == expected.len() && bool::from(token.ct_eq(expected))
        }
        None => false,
    };

    if authorized {
        Ok(())
    } else {
        let error = ErrorResponse::new("FORBIDDEN", "Invalid or missing operator token");
        Err((StatusCode::FORBIDDEN, Json(error)).into_response())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Wallet Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// `POST /wallet/deposits` - Start a deposit and get the signed
/// redirect parameter set.
pub async fn initiate_deposit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<DepositRequest>,
) -> Response {
    let amount = match Money::parse(&request.amount) {
        Ok(amount) => amount,
        Err(e) => return invalid_amount(&request.amount, e),
    };

    match state
        .initiate_deposit_handler()
        .handle(InitiateDepositCommand {
            user_id: user.user_id,
            amount,
        })
        .await
    {
        Ok(initiation) => {
            (StatusCode::CREATED, Json(DepositResponse::from(initiation))).into_response()
        }
        Err(err) => wallet_error_response(err),
    }
}

/// `POST /wallet/withdrawals` - Reserve a withdrawal against the
/// available balance.
pub async fn request_withdrawal(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(request): Json<WithdrawalRequest>,
) -> Response {
    let amount = match Money::parse(&request.amount) {
        Ok(amount) => amount,
        Err(e) => return invalid_amount(&request.amount, e),
    };

    match state
        .request_withdrawal_handler()
        .handle(RequestWithdrawalCommand {
            user_id: user.user_id,
            amount,
        })
        .await
    {
        Ok(receipt) => {
            (StatusCode::CREATED, Json(WithdrawalResponse::from(receipt))).into_response()
        }
        Err(err) => wallet_error_response(err),
    }
}

/// `GET /wallet/balance` - Current three-bucket balance. A user who
/// never moved money gets an all-zero wallet, not a 404.
pub async fn get_balance(State(state): State<AppState>, user: AuthenticatedUser) -> Response {
    match state.ledger.load_balance(user.user_id).await {
        Ok(Some(balance)) => Json(BalanceResponse::from(balance)).into_response(),
        Ok(None) => Json(BalanceResponse::from(
            crate::domain::wallet::WalletBalance::empty(user.user_id, Utc::now()),
        ))
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "balance lookup failed");
            internal_error()
        }
    }
}

/// `GET /wallet/transactions/:id` - One ledger transaction, scoped to
/// the requesting user.
pub async fn get_transaction(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Response {
    let Ok(transaction_id) = id.parse::<TransactionId>() else {
        let error = ErrorResponse::new("INVALID_ID", "Transaction id must be a UUID");
        return (StatusCode::BAD_REQUEST, Json(error)).into_response();
    };

    match state.ledger.find_transaction(transaction_id).await {
        Ok(Some(tx)) if tx.user_id == user.user_id => {
            Json(TransactionResponse::from(tx)).into_response()
        }
        // Someone else's transaction reads as absent
        Ok(_) => {
            let error = ErrorResponse::new("TRANSACTION_NOT_FOUND", "Transaction not found");
            (StatusCode::NOT_FOUND, Json(error)).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "transaction lookup failed");
            internal_error()
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Operator Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// `POST /operator/settlements` - Confirm a payout of a reserved
/// withdrawal.
pub async fn settle_withdrawal(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<SettleRequest>,
) -> Response {
    if let Err(response) = operator_authorized(&state.settings, &headers) {
        return response;
    }

    let Ok(transaction_id) = request.transaction_id.parse::<TransactionId>() else {
        let error = ErrorResponse::new("INVALID_ID", "Transaction id must be a UUID");
        return (StatusCode::BAD_REQUEST, Json(error)).into_response();
    };

    match state
        .settle_withdrawal_handler()
        .handle(SettleWithdrawalCommand {
            transaction_id,
            external_reference: request.external_reference,
        })
        .await
    {
        Ok(SettleWithdrawalResult::Settled(receipt)) => {
            Json(WithdrawalResponse::from(receipt)).into_response()
        }
        Ok(SettleWithdrawalResult::Replayed { status }) => {
            let error = ErrorResponse::new(
                "ALREADY_SETTLED",
                format!("Transaction already terminal in state {}", status),
            );
            // Replay of a settlement is success for the caller too
            (StatusCode::OK, Json(error)).into_response()
        }
        Err(err) => wallet_error_response(err),
    }
}

/// `POST /operator/reconcile` - Run one reservation expiry pass.
pub async fn run_reconcile(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(response) = operator_authorized(&state.settings, &headers) {
        return response;
    }

    let summary = state.expire_reservations_handler().handle(Utc::now()).await;
    Json(ReconcileResponse::from(summary)).into_response()
}

// ════════════════════════════════════════════════════════════════════════════════
// Webhook Endpoint
// ════════════════════════════════════════════════════════════════════════════════

/// `POST /webhooks/gateway` - Inbound payment notification.
///
/// Success answers with the literal body `OK`; the gateway only
/// inspects the status class, and redelivers on anything non-2xx.
pub async fn handle_gateway_webhook(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let client_ip = extract_client_ip(&headers).or(Some(peer.ip()));

    match state
        .process_notification_handler()
        .handle(ProcessNotificationCommand {
            body: body.to_vec(),
            client_ip,
        })
        .await
    {
        Ok(result) => {
            tracing::debug!(?result, "notification processed");
            (StatusCode::OK, "OK").into_response()
        }
        Err(err) => {
            tracing::warn!(
                error = %err,
                code = err.error_code(),
                retryable = err.is_retryable(),
                "notification rejected"
            );
            let error = ErrorResponse::new(err.error_code(), err.to_string());
            (err.status_code(), Json(error)).into_response()
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Mapping
// ════════════════════════════════════════════════════════════════════════════════

fn invalid_amount(raw: &str, err: crate::domain::foundation::MoneyError) -> Response {
    let error = ErrorResponse::new("INVALID_AMOUNT", format!("\"{}\": {}", raw, err));
    (StatusCode::BAD_REQUEST, Json(error)).into_response()
}

fn internal_error() -> Response {
    let error = ErrorResponse::new("INTERNAL_ERROR", "Internal server error");
    (StatusCode::INTERNAL_SERVER_ERROR, Json(error)).into_response()
}

fn wallet_error_response(err: WalletError) -> Response {
    let (status, code) = match &err {
        WalletError::InsufficientFunds { .. } => (StatusCode::BAD_REQUEST, "INSUFFICIENT_FUNDS"),
        WalletError::BelowMinimum { .. } => (StatusCode::BAD_REQUEST, "BELOW_MINIMUM"),
        WalletError::AboveMaximum { .. } => (StatusCode::BAD_REQUEST, "ABOVE_MAXIMUM"),
        WalletError::InvalidAmount(_) => (StatusCode::BAD_REQUEST, "INVALID_AMOUNT"),
        WalletError::TransactionNotFound => (StatusCode::NOT_FOUND, "TRANSACTION_NOT_FOUND"),
        WalletError::AlreadyTerminal { .. } => (StatusCode::CONFLICT, "ALREADY_TERMINAL"),
        WalletError::InvalidTransition { .. } => (StatusCode::CONFLICT, "INVALID_TRANSITION"),
        WalletError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %err, "wallet operation failed");
        return internal_error();
    }

    let error = ErrorResponse::new(code, err.to_string());
    (status, Json(error)).into_response()
}
