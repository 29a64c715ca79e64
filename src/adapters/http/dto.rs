//! HTTP DTOs (Data Transfer Objects) for the wallet and webhook API.
//!
//! These types define the JSON request/response structure and serve as
//! the boundary between HTTP and the application layer. Amounts cross
//! the wire as decimal strings, never floats.

use serde::{Deserialize, Serialize};

use crate::application::handlers::{DepositInitiation, ReconcileSummary};
use crate::domain::wallet::{WalletBalance, WalletTransaction};
use crate::ports::WithdrawalReceipt;

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Request to start a deposit.
#[derive(Debug, Clone, Deserialize)]
pub struct DepositRequest {
    /// Decimal amount, e.g. "200.00".
    pub amount: String,
}

/// Request to reserve a withdrawal.
#[derive(Debug, Clone, Deserialize)]
pub struct WithdrawalRequest {
    /// Decimal amount, e.g. "300.00".
    pub amount: String,
}

/// Request to confirm a payout of a reserved withdrawal.
#[derive(Debug, Clone, Deserialize)]
pub struct SettleRequest {
    pub transaction_id: String,
    /// Bank or gateway payout reference.
    #[serde(default)]
    pub external_reference: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// One gateway redirect parameter. Order matters to the gateway, so
/// parameters travel as an array, not an object.
#[derive(Debug, Clone, Serialize)]
pub struct RedirectParam {
    pub name: String,
    pub value: String,
}

/// Response for a deposit initiation.
#[derive(Debug, Clone, Serialize)]
pub struct DepositResponse {
    pub transaction_id: String,
    pub status: String,
    pub amount: String,
    /// Gateway checkout URL to redirect the shopper to.
    pub redirect_url: String,
    /// Signed parameters, in submission order.
    pub params: Vec<RedirectParam>,
}

impl From<DepositInitiation> for DepositResponse {
    fn from(initiation: DepositInitiation) -> Self {
        Self {
            transaction_id: initiation.transaction.id.to_string(),
            status: initiation.transaction.status.to_string(),
            amount: initiation.transaction.amount.to_string(),
            redirect_url: initiation.redirect_url,
            params: initiation
                .params
                .iter()
                .map(|(name, value)| RedirectParam {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
        }
    }
}

/// Response for a withdrawal reservation or settlement.
#[derive(Debug, Clone, Serialize)]
pub struct WithdrawalResponse {
    pub transaction_id: String,
    pub status: String,
    pub amount: String,
    pub available: String,
    pub pending_withdrawal: String,
}

impl From<WithdrawalReceipt> for WithdrawalResponse {
    fn from(receipt: WithdrawalReceipt) -> Self {
        Self {
            transaction_id: receipt.transaction.id.to_string(),
            status: receipt.transaction.status.to_string(),
            amount: receipt.transaction.amount.to_string(),
            available: receipt.available.to_string(),
            pending_withdrawal: receipt.pending_withdrawal.to_string(),
        }
    }
}

/// Response for the wallet balance view.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceResponse {
    pub user_id: String,
    pub available: String,
    pub locked: String,
    pub pending_withdrawal: String,
    pub total_deposited: String,
    pub total_withdrawn: String,
}

impl From<WalletBalance> for BalanceResponse {
    fn from(balance: WalletBalance) -> Self {
        Self {
            user_id: balance.user_id.to_string(),
            available: balance.available.to_string(),
            locked: balance.locked.to_string(),
            pending_withdrawal: balance.pending_withdrawal.to_string(),
            total_deposited: balance.total_deposited.to_string(),
            total_withdrawn: balance.total_withdrawn.to_string(),
        }
    }
}

/// Response for a single ledger transaction.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResponse {
    pub id: String,
    pub tx_type: String,
    pub amount: String,
    pub status: String,
    pub external_reference: Option<String>,
    pub balance_after: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<WalletTransaction> for TransactionResponse {
    fn from(tx: WalletTransaction) -> Self {
        Self {
            id: tx.id.to_string(),
            tx_type: tx.tx_type.to_string(),
            amount: tx.amount.to_string(),
            status: tx.status.to_string(),
            external_reference: tx.external_reference,
            balance_after: tx.balance_after.map(|m| m.to_string()),
            created_at: tx.created_at.to_rfc3339(),
            updated_at: tx.updated_at.to_rfc3339(),
        }
    }
}

/// Response for a reconciler run.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResponse {
    pub processed: usize,
    pub released: usize,
    pub already_handled: usize,
    pub failed: Vec<String>,
    pub duration_ms: u128,
}

impl From<ReconcileSummary> for ReconcileResponse {
    fn from(summary: ReconcileSummary) -> Self {
        Self {
            processed: summary.processed,
            released: summary.released,
            already_handled: summary.already_handled,
            failed: summary.failed.iter().map(|id| id.to_string()).collect(),
            duration_ms: summary.duration_ms,
        }
    }
}

/// Standard error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }
}
