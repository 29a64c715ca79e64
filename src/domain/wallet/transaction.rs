//! Ledger transaction state machine.
//!
//! Every money-movement attempt is recorded exactly once. A transaction
//! is born `pending` and moves to exactly one terminal state; terminal
//! states are immutable, which is what makes replayed gateway
//! notifications safe no-ops.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::{Money, TransactionId, UserId};

use super::errors::WalletError;

/// Kind of money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    /// Funds entering the wallet from the gateway.
    Deposit,
    /// Funds leaving the wallet to the user's bank.
    Withdrawal,
    /// Available funds moved into the locked bucket for an open order.
    EscrowHold,
    /// Locked funds released back or paid out on order completion.
    EscrowRelease,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "deposit",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::EscrowHold => "escrow_hold",
            TransactionType::EscrowRelease => "escrow_release",
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl TransactionStatus {
    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Whether the state machine permits moving to `next`.
    ///
    /// Only `pending -> {completed, failed, cancelled}` is legal; there
    /// are no back-transitions and no terminal-to-terminal moves.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(self, TransactionStatus::Pending) && next.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single money-movement record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletTransaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub tx_type: TransactionType,
    pub amount: Money,
    pub status: TransactionStatus,
    /// Gateway-side payment id once known; the idempotency key for
    /// inbound notifications.
    pub external_reference: Option<String>,
    /// Available balance immediately after the terminal transition, for
    /// statement rendering. Only set on completion.
    pub balance_after: Option<Money>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletTransaction {
    /// Creates a fresh pending transaction.
    pub fn pending(
        user_id: UserId,
        tx_type: TransactionType,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            user_id,
            tx_type,
            amount,
            status: TransactionStatus::Pending,
            external_reference: None,
            balance_after: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies a terminal transition, enforcing the state machine.
    pub fn transition_to(
        &mut self,
        next: TransactionStatus,
        now: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        if self.status.is_terminal() {
            return Err(WalletError::AlreadyTerminal {
                status: self.status,
            });
        }
        if !self.status.can_transition_to(next) {
            return Err(WalletError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_tx() -> WalletTransaction {
        WalletTransaction::pending(
            UserId::new(),
            TransactionType::Deposit,
            Money::from_cents(20000).unwrap(),
            Utc::now(),
        )
    }

    #[test]
    fn new_transaction_starts_pending() {
        let tx = pending_tx();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert!(tx.external_reference.is_none());
        assert!(tx.balance_after.is_none());
    }

    #[test]
    fn pending_is_not_terminal() {
        assert!(!TransactionStatus::Pending.is_terminal());
        assert!(TransactionStatus::Completed.is_terminal());
        assert!(TransactionStatus::Failed.is_terminal());
        assert!(TransactionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn pending_can_reach_every_terminal_state() {
        for next in [
            TransactionStatus::Completed,
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
        ] {
            assert!(TransactionStatus::Pending.can_transition_to(next));
        }
    }

    #[test]
    fn pending_cannot_transition_to_pending() {
        assert!(!TransactionStatus::Pending.can_transition_to(TransactionStatus::Pending));
    }

    #[test]
    fn terminal_states_admit_no_transitions() {
        for from in [
            TransactionStatus::Completed,
            TransactionStatus::Failed,
            TransactionStatus::Cancelled,
        ] {
            for to in [
                TransactionStatus::Pending,
                TransactionStatus::Completed,
                TransactionStatus::Failed,
                TransactionStatus::Cancelled,
            ] {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn transition_moves_pending_to_completed() {
        let mut tx = pending_tx();
        tx.transition_to(TransactionStatus::Completed, Utc::now())
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
    }

    #[test]
    fn transition_from_terminal_reports_already_terminal() {
        let mut tx = pending_tx();
        tx.transition_to(TransactionStatus::Failed, Utc::now())
            .unwrap();
        let err = tx
            .transition_to(TransactionStatus::Completed, Utc::now())
            .unwrap_err();
        assert_eq!(
            err,
            WalletError::AlreadyTerminal {
                status: TransactionStatus::Failed
            }
        );
    }

    #[test]
    fn transition_updates_timestamp() {
        let mut tx = pending_tx();
        let later = tx.created_at + chrono::Duration::seconds(30);
        tx.transition_to(TransactionStatus::Cancelled, later).unwrap();
        assert_eq!(tx.updated_at, later);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&TransactionStatus::Completed).unwrap(),
            "\"completed\""
        );
        assert_eq!(
            serde_json::to_string(&TransactionType::EscrowHold).unwrap(),
            "\"escrow_hold\""
        );
    }
}
