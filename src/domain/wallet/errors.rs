//! Wallet and ledger error types.

use thiserror::Error;

use crate::domain::foundation::{Money, MoneyError};

use super::transaction::TransactionStatus;

/// Errors from wallet balance operations and ledger transitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// Withdrawal larger than the available bucket. Carries the current
    /// available balance so the caller can show it.
    #[error("Insufficient balance: available {available}")]
    InsufficientFunds { available: Money },

    /// Amount below the configured minimum for the operation.
    #[error("Amount below minimum of {minimum}")]
    BelowMinimum { minimum: Money },

    /// Amount above the configured maximum for the operation.
    #[error("Amount above maximum of {maximum}")]
    AboveMaximum { maximum: Money },

    /// Amount was zero, negative, malformed, or beyond storage precision.
    #[error("Invalid amount: {0}")]
    InvalidAmount(#[from] MoneyError),

    /// Referenced transaction does not exist.
    #[error("Transaction not found")]
    TransactionNotFound,

    /// Transaction already reached a terminal state.
    #[error("Transaction already terminal in state {status}")]
    AlreadyTerminal { status: TransactionStatus },

    /// The requested status change is not a legal transition.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Storage layer failure; the operation was rolled back.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<crate::domain::foundation::DomainError> for WalletError {
    fn from(err: crate::domain::foundation::DomainError) -> Self {
        WalletError::Storage(err.to_string())
    }
}
