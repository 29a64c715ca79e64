//! Ledger store port - wallets and the transaction state machine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::{DomainError, Money, TransactionId, UserId};
use crate::domain::wallet::{
    LedgerAuthority, TransactionStatus, TransactionType, WalletBalance, WalletError,
    WalletTransaction,
};

/// Result of applying a deposit notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepositOutcome {
    /// Balance mutated and transaction completed, atomically.
    Applied { balance_after: Money },
    /// Transaction was already terminal; nothing changed. The gateway
    /// delivers at-least-once, so this is a success, not an error.
    AlreadyTerminal { status: TransactionStatus },
}

/// Result of a successful withdrawal reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithdrawalReceipt {
    pub transaction: WalletTransaction,
    pub available: Money,
    pub pending_withdrawal: Money,
}

/// Persistence port for wallets and wallet transactions.
///
/// The mutating operations take a [`LedgerAuthority`] capability and
/// must each execute as a single transactional unit with row-level
/// exclusivity on the wallet: balance change and status change commit
/// together or not at all.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Creates a `pending` transaction for the given user and amount.
    ///
    /// The wallet row is created lazily if this is the user's first
    /// money movement.
    async fn create_pending(
        &self,
        user_id: UserId,
        tx_type: TransactionType,
        amount: Money,
    ) -> Result<WalletTransaction, DomainError>;

    /// Looks up a transaction by id.
    async fn find_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<WalletTransaction>, DomainError>;

    /// Loads the current balance for a user; `None` when the user has
    /// never held a wallet.
    async fn load_balance(&self, user_id: UserId) -> Result<Option<WalletBalance>, DomainError>;

    /// Atomically credits a completed deposit.
    ///
    /// Locks the wallet row, re-checks the transaction is still
    /// `pending`, applies `available += amount; total_deposited +=
    /// amount`, and marks the transaction `completed` with
    /// `balance_after` - all in one transaction. A replay (transaction
    /// already terminal) returns [`DepositOutcome::AlreadyTerminal`]
    /// without mutating anything.
    async fn complete_deposit(
        &self,
        authority: &LedgerAuthority,
        tx_id: TransactionId,
        amount: Money,
        external_reference: &str,
    ) -> Result<DepositOutcome, WalletError>;

    /// Marks a pending transaction `failed` or `cancelled` with no
    /// balance mutation. Idempotent: an already-terminal transaction is
    /// reported, not re-transitioned.
    async fn mark_terminal(
        &self,
        authority: &LedgerAuthority,
        tx_id: TransactionId,
        status: TransactionStatus,
        external_reference: &str,
    ) -> Result<DepositOutcome, WalletError>;

    /// Atomically reserves a withdrawal.
    ///
    /// Under wallet row exclusivity: verify `available >= amount`, move
    /// the funds into `pending_withdrawal`, and create the `pending`
    /// transaction. Two racing requests whose sum exceeds `available`
    /// must not both succeed.
    async fn request_withdrawal(
        &self,
        authority: &LedgerAuthority,
        user_id: UserId,
        amount: Money,
        requested_at: DateTime<Utc>,
    ) -> Result<WithdrawalReceipt, WalletError>;

    /// Atomically settles a reserved withdrawal:
    /// `pending_withdrawal -= amount; total_withdrawn += amount` and the
    /// transaction becomes `completed`.
    async fn settle_withdrawal(
        &self,
        authority: &LedgerAuthority,
        tx_id: TransactionId,
        external_reference: Option<&str>,
    ) -> Result<WithdrawalReceipt, WalletError>;

    /// Atomically returns a reserved withdrawal to `available`:
    /// `pending_withdrawal -= amount; available += amount` and the
    /// transaction becomes `failed` or `cancelled`.
    async fn release_withdrawal(
        &self,
        authority: &LedgerAuthority,
        tx_id: TransactionId,
        status: TransactionStatus,
        external_reference: Option<&str>,
    ) -> Result<WithdrawalReceipt, WalletError>;
}
